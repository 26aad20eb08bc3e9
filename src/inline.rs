//! Recursive descent over a paragraph's inline segment tree.
//!
//! Produces normalized text, style events over it, interleaved image items
//! for the mixed-content path, and the footnote ids referenced by links.

use crate::events::StyleEvent;
use crate::text::TextBuilder;
use bindery_idf::{FootnoteIndex, InlineKind, InlineSegment};
use bindery_style::{PropValue, StyleContext, StyleRegistry};
use bindery_types::{sym, AnchorId, ResourceName};

/// A text run or inline image, in source order, for mixed content lists.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineChunk {
    Text(String),
    Image {
        resource: ResourceName,
        alt: Option<String>,
    },
}

#[derive(Debug, Default)]
pub struct InlineOutput {
    /// The full paragraph text (pure-text path).
    pub text: String,
    /// Ordered runs and images (mixed path); the trailing text run is
    /// included.
    pub chunks: Vec<InlineChunk>,
    pub events: Vec<StyleEvent>,
    /// Footnote ids referenced from this paragraph, for backlinks.
    pub note_refs: Vec<String>,
    pub has_images: bool,
}

/// Resolves a `#id` resource reference; anything else has no registered
/// resource behind it.
pub fn resource_from_href(href: &str) -> Option<ResourceName> {
    href.strip_prefix('#').map(ResourceName::from)
}

struct Frame {
    class: Option<String>,
    link: Option<AnchorId>,
    footnote: bool,
    /// Classes promoted into the block style emit no events of their own.
    promoted: bool,
}

pub struct InlineWalker<'a> {
    registry: &'a mut StyleRegistry,
    ctx: &'a StyleContext,
    footnotes: &'a FootnoteIndex,
    /// Titles and headings use delta-only event styles.
    heading_delta: bool,
    promoted: Vec<String>,
    writer: TextBuilder,
    chunks: Vec<InlineChunk>,
    events: Vec<StyleEvent>,
    note_refs: Vec<String>,
    has_images: bool,
}

impl<'a> InlineWalker<'a> {
    pub fn new(
        registry: &'a mut StyleRegistry,
        ctx: &'a StyleContext,
        footnotes: &'a FootnoteIndex,
        heading_delta: bool,
        promoted: Vec<String>,
    ) -> Self {
        Self {
            registry,
            ctx,
            footnotes,
            heading_delta,
            promoted,
            writer: TextBuilder::new(),
            chunks: Vec::new(),
            events: Vec::new(),
            note_refs: Vec::new(),
            has_images: false,
        }
    }

    pub fn rune_count(&self) -> usize {
        self.writer.rune_count()
    }

    pub fn mark(&mut self) -> usize {
        self.writer.mark()
    }

    /// Writes a structural separator (title line breaks).
    pub fn write_raw(&mut self, ch: char) {
        self.writer.write_raw(ch);
    }

    pub fn push_event(&mut self, event: StyleEvent) {
        self.events.push(event);
    }

    /// Resolves `classes` the way this walker resolves segment styles and
    /// records the event over `[offset, offset + length)`. Empty deltas
    /// record nothing.
    pub fn class_event(&mut self, offset: usize, length: usize, classes: &[String]) {
        let style = if self.heading_delta {
            self.ctx.resolve_inline_delta(self.registry, classes)
        } else {
            self.ctx.resolve_inline(self.registry, classes)
        };
        if !style.is_empty() {
            self.events.push(StyleEvent::new(offset, length, style));
        }
    }

    pub fn walk(&mut self, segments: &[InlineSegment]) {
        let mut stack = Vec::new();
        for seg in segments {
            self.walk_segment(seg, &mut stack);
        }
    }

    fn walk_segment(&mut self, seg: &InlineSegment, stack: &mut Vec<Frame>) {
        match seg.kind {
            InlineKind::Text => self.writer.write_str(&seg.text),
            InlineKind::InlineImage => self.place_image(seg),
            _ => self.walk_styled(seg, stack),
        }
    }

    fn place_image(&mut self, seg: &InlineSegment) {
        let Some(image) = &seg.image else {
            log::warn!("inline image segment without an image payload; dropped");
            return;
        };
        let Some(resource) = resource_from_href(&image.href) else {
            log::warn!("dropping inline image with unresolvable href '{}'", image.href);
            return;
        };
        // Cut the text collected so far; the image sits after any pending
        // space, which the cut claims exactly once.
        let text = self.writer.take_chunk();
        if !text.is_empty() {
            self.chunks.push(InlineChunk::Text(text));
        }
        self.writer.continue_after_inline();
        self.chunks.push(InlineChunk::Image {
            resource,
            alt: image.alt.clone(),
        });
        self.has_images = true;
    }

    fn walk_styled(&mut self, seg: &InlineSegment, stack: &mut Vec<Frame>) {
        let mut frame = Frame {
            class: None,
            link: None,
            footnote: false,
            promoted: false,
        };
        match seg.kind {
            InlineKind::Strong => frame.class = Some("strong".into()),
            InlineKind::Emphasis => frame.class = Some("emphasis".into()),
            InlineKind::Strikethrough => frame.class = Some("strikethrough".into()),
            InlineKind::Sub => frame.class = Some("sub".into()),
            InlineKind::Sup => frame.class = Some("sup".into()),
            InlineKind::Code => frame.class = Some("code".into()),
            InlineKind::NamedStyle => frame.class = seg.style.clone(),
            InlineKind::Link => match seg.href.as_deref() {
                Some(href) => {
                    let (class, link, footnote) = self.classify_link(href);
                    if footnote {
                        self.note_refs.push(href[1..].to_string());
                    }
                    frame.class = Some(class);
                    frame.link = Some(link);
                    frame.footnote = footnote;
                }
                None => {
                    log::warn!("link segment without href; rendering as plain text");
                }
            },
            InlineKind::Text | InlineKind::InlineImage => unreachable!("handled by walk_segment"),
        }
        frame.promoted = frame
            .class
            .as_deref()
            .is_some_and(|c| self.promoted.iter().any(|p| p == c));

        let code = seg.kind == InlineKind::Code;
        if code {
            self.writer.set_preserve_whitespace(true);
        }

        let start = self.writer.mark();
        if let Some(class) = frame.class.clone() {
            self.write_pseudo(&class, "::before");
        }
        self.writer.write_str(&seg.text);
        stack.push(frame);
        for child in &seg.children {
            self.walk_segment(child, stack);
        }
        let frame = stack.pop().expect("frame pushed above");
        if let Some(class) = frame.class.clone() {
            self.write_pseudo(&class, "::after");
        }
        if code {
            self.writer.set_preserve_whitespace(false);
        }
        let end = self.writer.rune_count();

        if end == start || frame.promoted {
            return;
        }

        // Merged event style: ancestor inline classes plus this segment's.
        let mut classes: Vec<String> = stack
            .iter()
            .filter(|f| !f.promoted)
            .filter_map(|f| f.class.clone())
            .collect();
        if let Some(class) = frame.class.clone() {
            classes.push(class);
        }
        let style = if classes.is_empty() {
            String::new()
        } else if self.heading_delta {
            self.ctx.resolve_inline_delta(self.registry, &classes)
        } else {
            self.ctx.resolve_inline(self.registry, &classes)
        };

        // A non-link segment inherits the innermost ancestor link.
        let (link, footnote) = match &frame.link {
            Some(link) => (Some(link.clone()), frame.footnote),
            None => stack
                .iter()
                .rev()
                .find_map(|f| f.link.clone().map(|l| (Some(l), f.footnote)))
                .unwrap_or((None, false)),
        };

        if !style.is_empty() || link.is_some() {
            let mut event = StyleEvent::new(start, end - start, style);
            if let Some(link) = link {
                event = event.with_link(link, footnote);
            }
            self.events.push(event);
        }
    }

    fn classify_link(&mut self, href: &str) -> (String, AnchorId, bool) {
        if let Some(id) = href.strip_prefix('#') {
            if self.footnotes.contains(id) {
                ("link-footnote".into(), AnchorId::from(id), true)
            } else {
                ("link-internal".into(), AnchorId::from(id), false)
            }
        } else {
            let anchor = self.registry.register_external_link(href);
            ("link-external".into(), anchor, false)
        }
    }

    fn write_pseudo(&mut self, class: &str, which: &str) {
        let name = format!("{class}{which}");
        let Some(def) = self.registry.get(&name) else {
            return;
        };
        if let Some(PropValue::Str(content)) = def.props.get(&sym::CONTENT) {
            let text = content
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string();
            self.writer.write_str(&text);
        }
    }

    pub fn finish(mut self) -> InlineOutput {
        let tail = self.writer.finish();
        let text = if self.has_images {
            if !tail.is_empty() {
                self.chunks.push(InlineChunk::Text(tail));
            }
            String::new()
        } else {
            tail
        };
        InlineOutput {
            text,
            chunks: self.chunks,
            events: self.events,
            note_refs: self.note_refs,
            has_images: self.has_images,
        }
    }
}

/// Detects whole-paragraph styling: when the paragraph's visible content is
/// a single chain of styling elements (plus surrounding whitespace), the
/// chain merges into the block style instead of producing style events.
///
/// Links, images, sub and sup need their own events or geometry, so any of
/// them anywhere in the tree disables the promotion.
pub fn spanning_style_chain(segments: &[InlineSegment]) -> Option<Vec<String>> {
    fn contains_forbidden(seg: &InlineSegment) -> bool {
        matches!(
            seg.kind,
            InlineKind::Link | InlineKind::InlineImage | InlineKind::Sub | InlineKind::Sup
        ) || seg.children.iter().any(contains_forbidden)
    }
    if segments.iter().any(contains_forbidden) {
        return None;
    }

    fn kind_class(seg: &InlineSegment) -> Option<String> {
        match seg.kind {
            InlineKind::Strong => Some("strong".into()),
            InlineKind::Emphasis => Some("emphasis".into()),
            InlineKind::Strikethrough => Some("strikethrough".into()),
            InlineKind::Code => Some("code".into()),
            InlineKind::NamedStyle => seg.style.clone(),
            _ => None,
        }
    }

    let mut chain = Vec::new();
    let mut level = segments;
    loop {
        let visible: Vec<&InlineSegment> = level
            .iter()
            .filter(|s| !(s.kind == InlineKind::Text && s.text.trim().is_empty()))
            .collect();
        if visible.len() != 1 || visible[0].kind == InlineKind::Text {
            return None; // plain text, multiple siblings, or nothing at all
        }
        let node = visible[0];
        let class = kind_class(node)?;
        chain.push(class);

        let inner: Vec<&InlineSegment> = node
            .children
            .iter()
            .filter(|s| !(s.kind == InlineKind::Text && s.text.trim().is_empty()))
            .collect();
        let all_text = inner.iter().all(|s| s.kind == InlineKind::Text);
        if all_text {
            // The chain bottoms out in pure text.
            return Some(chain);
        }
        if !node.text.trim().is_empty() {
            // Text mixed with nested elements under one wrapper: the
            // wrapper's ranges differ, so events stay.
            return None;
        }
        level = &node.children;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_idf::Image;

    fn seg_text(s: &str) -> InlineSegment {
        InlineSegment::text(s)
    }

    #[test]
    fn single_wrapper_chain_is_promoted() {
        let segments = vec![InlineSegment::strong(vec![seg_text("Whole line.")])];
        assert_eq!(spanning_style_chain(&segments), Some(vec!["strong".into()]));
    }

    #[test]
    fn nested_chain_collects_all_classes() {
        let segments = vec![InlineSegment::strong(vec![InlineSegment::emphasis(vec![
            seg_text("All of it"),
        ])])];
        assert_eq!(
            spanning_style_chain(&segments),
            Some(vec!["strong".into(), "emphasis".into()])
        );
    }

    #[test]
    fn surrounding_whitespace_does_not_break_promotion() {
        let segments = vec![
            seg_text("  "),
            InlineSegment::emphasis(vec![seg_text("text")]),
            seg_text(" "),
        ];
        assert_eq!(spanning_style_chain(&segments), Some(vec!["emphasis".into()]));
    }

    #[test]
    fn multiple_siblings_break_promotion() {
        let segments = vec![
            InlineSegment::strong(vec![seg_text("a")]),
            seg_text("tail"),
        ];
        assert_eq!(spanning_style_chain(&segments), None);
    }

    #[test]
    fn forbidden_kinds_disable_promotion() {
        let segments = vec![InlineSegment::strong(vec![InlineSegment::sup(vec![
            seg_text("x"),
        ])])];
        assert_eq!(spanning_style_chain(&segments), None);

        let link = vec![InlineSegment::link("#n1", vec![seg_text("ref")])];
        assert_eq!(spanning_style_chain(&link), None);

        let img = vec![InlineSegment::inline_image(Image {
            href: "#pic".into(),
            ..Default::default()
        })];
        assert_eq!(spanning_style_chain(&img), None);
    }

    #[test]
    fn wrapper_mixing_text_and_elements_is_not_promoted() {
        // strong wraps direct text plus an inner emphasis: the inner range
        // differs from the outer one, so both need events.
        let segments = vec![InlineSegment {
            kind: InlineKind::Strong,
            text: "lead ".into(),
            style: None,
            href: None,
            image: None,
            children: vec![InlineSegment::emphasis(vec![seg_text("inner")])],
        }];
        assert_eq!(spanning_style_chain(&segments), None);
    }
}
