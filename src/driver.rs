//! The tree driver: walks the parsed source document, decides storyline
//! boundaries, and feeds the storyline builder.

use crate::content::ContentAccumulator;
use crate::entry::{CellExtras, ContentEntry, EntryContent, EntryType, StyleSlot};
use crate::error::BuildError;
use crate::events::{fill_style_event_gaps, segment_events, StyleEvent};
use crate::fragment::{resource_path_fragment, Fragment, FragmentList};
use crate::inline::{resource_from_href, spanning_style_chain, InlineChunk, InlineWalker};
use crate::pipeline::PublicationOptions;
use crate::storyline::{ContainerFlags, ContainerKind, MixedPart, StorylineBuilder};
use bindery_idf::{
    Annotation, Book, Cite, Epigraph, FlowItem, FootnoteIndex, Image, InlineSegment, Paragraph,
    Poem, Section, Table, TableCell, Title, TitleItem,
};
use bindery_style::{
    new_empty_line_handle, parse_declarations, Dim, PropValue, StyleContext, StyleRegistry,
    UsageKind,
};
use bindery_types::{sym, AnchorId, ResourceName, Value, ValueMap};
use std::collections::HashMap;

/// A titled section at or above this depth opens its own storyline.
pub const MAX_STORYLINE_SPLIT_DEPTH: usize = 2;

struct Current {
    builder: StorylineBuilder,
    root_ctx: StyleContext,
    root_depth: usize,
    seq: u32,
}

#[derive(Debug, Clone)]
struct TocItem {
    title: String,
    section_name: String,
    depth: usize,
}

pub struct TreeDriver<'a> {
    registry: &'a mut StyleRegistry,
    footnotes: &'a FootnoteIndex,
    options: &'a PublicationOptions,
    accumulator: ContentAccumulator,
    fragments: FragmentList,
    next_eid: u32,
    storyline_seq: u32,
    section_seq: u32,
    toc: Vec<TocItem>,
    /// Footnote id -> the anchor of the first referencing location.
    backlinks: HashMap<String, AnchorId>,
}

impl<'a> TreeDriver<'a> {
    pub fn new(
        registry: &'a mut StyleRegistry,
        footnotes: &'a FootnoteIndex,
        options: &'a PublicationOptions,
    ) -> Self {
        Self {
            registry,
            footnotes,
            options,
            accumulator: ContentAccumulator::new(1),
            fragments: FragmentList::new(),
            next_eid: options.start_eid,
            storyline_seq: 0,
            section_seq: 0,
            toc: Vec::new(),
            backlinks: HashMap::new(),
        }
    }

    pub fn run(mut self, book: &Book) -> Result<FragmentList, BuildError> {
        if let Some(spec) = self.options.cover.clone() {
            self.emit_cover_resource(spec.resource, spec.width as f64, spec.height as f64, None)?;
        } else if let Some(cover) = &book.cover {
            self.emit_cover(cover)?;
        }
        if self.options.annotation_page {
            if let Some(annotation) = &book.annotation {
                self.annotation_page(annotation)?;
            }
        }

        for body in &book.bodies {
            if !self.is_footnote_body(body) {
                self.process_body(body)?;
            }
        }
        for body in &book.bodies {
            if self.is_footnote_body(body) {
                for section in &body.sections {
                    self.footnote_section(section)?;
                }
            }
        }

        if self.options.toc_page && !self.toc.is_empty() {
            self.toc_page()?;
        }

        for (name, paragraphs) in self.accumulator.finish() {
            let list = paragraphs.into_iter().map(Value::Str).collect();
            self.fragments.push(Fragment {
                fragment_type: sym::CONTENT_FRAGMENT,
                name: name.clone(),
                value: ValueMap::new()
                    .set(sym::NAME, Value::symbol(name))
                    .set(sym::CONTENT_LIST, Value::List(list))
                    .build(),
            })?;
        }
        self.fragments.push(resource_path_fragment())?;
        Ok(self.fragments)
    }

    fn is_footnote_body(&self, body: &bindery_idf::Body) -> bool {
        body.name
            .as_deref()
            .is_some_and(|name| self.options.footnote_body_names.iter().any(|n| n == name))
    }

    // --- Storyline lifecycle ---

    fn new_storyline(&mut self, root_depth: usize) -> Current {
        self.storyline_seq += 1;
        self.section_seq += 1;
        let builder = StorylineBuilder::new(
            format!("l{}", self.storyline_seq),
            format!("c{}", to_base36(self.section_seq)),
            self.next_eid,
        );
        let root_ctx = StyleContext::root().with_empty_line(new_empty_line_handle());
        Current {
            builder,
            root_ctx,
            root_depth,
            seq: self.storyline_seq,
        }
    }

    fn finish_storyline(&mut self, current: Current) -> Result<(), BuildError> {
        self.next_eid = current.builder.next_free_eid();
        let (storyline, section) = current.builder.build(self.registry)?;
        self.fragments.push(storyline)?;
        self.fragments.push(section)?;
        Ok(())
    }

    fn process_body(&mut self, body: &bindery_idf::Body) -> Result<(), BuildError> {
        let mut current: Option<Current> = None;

        if body.title.is_some() || !body.epigraphs.is_empty() || body.image.is_some() {
            let mut cur = self.new_storyline(1);
            let ctx = cur.root_ctx.clone();
            if let Some(title) = &body.title {
                self.toc.push(TocItem {
                    title: title_text(title),
                    section_name: cur.builder.section_name().to_string(),
                    depth: 1,
                });
                self.add_title(&mut cur, &ctx, title, 1)?;
            }
            for epigraph in &body.epigraphs {
                self.epigraph(&mut cur, &ctx, epigraph)?;
            }
            if let Some(image) = &body.image {
                self.flow_image(&mut cur, &ctx, image);
            }
            current = Some(cur);
        }

        for section in &body.sections {
            self.walk_section(&mut current, None, section, 1)?;
        }
        if let Some(cur) = current.take() {
            if cur.builder.is_empty() {
                log::debug!("dropping empty trailing storyline");
                self.next_eid = cur.builder.next_free_eid();
            } else {
                self.finish_storyline(cur)?;
            }
        }
        Ok(())
    }

    // --- Sections ---

    fn walk_section(
        &mut self,
        current: &mut Option<Current>,
        parent_ctx: Option<&StyleContext>,
        section: &Section,
        depth: usize,
    ) -> Result<(), BuildError> {
        let titled = section.title.is_some();
        let split_depth = self.options.max_storyline_split_depth;
        let splits = titled && depth <= split_depth;

        if splits {
            if let Some(cur) = current.take() {
                self.finish_storyline(cur)?;
            }
            let cur = self.new_storyline(depth);
            if let Some(title) = &section.title {
                self.toc.push(TocItem {
                    title: title_text(title),
                    section_name: cur.builder.section_name().to_string(),
                    depth,
                });
            }
            *current = Some(cur);
        } else if current.is_none() {
            *current = Some(self.new_storyline(depth));
        }

        let child_depth = if titled { depth + 1 } else { depth };
        let suppress_margins = section_is_spacer_only(section);

        // The section scope context. A fresh storyline restarts the chain
        // from the storyline root.
        let mut sec_ctx = {
            let cur = current.as_ref().expect("current storyline exists");
            let base = if splits || parent_ctx.is_none() {
                cur.root_ctx.clone()
            } else {
                parent_ctx.expect("checked above").clone()
            };
            base.push_block(self.registry, "div", &[String::from("section")])
        };
        let mut seen_seq = current.as_ref().expect("current exists").seq;

        let mut container_open;
        {
            let cur = current.as_mut().expect("current exists");
            self.open_section_container(cur, suppress_margins, &sec_ctx);
            container_open = true;

            if let Some(title) = &section.title {
                self.add_title(cur, &sec_ctx, title, depth)?;
            }
            for epigraph in &section.epigraphs {
                self.epigraph(cur, &sec_ctx, epigraph)?;
            }
            if let Some(image) = &section.image {
                self.flow_image(cur, &sec_ctx, image);
            }
            if let Some(annotation) = &section.annotation {
                self.annotation_block(cur, &sec_ctx, annotation)?;
            }
        }

        for item in &section.content {
            if let FlowItem::Section(sub) = item {
                // Close our container before any storyline switch; the
                // subsection decides its own fate.
                if container_open {
                    let cur = current.as_mut().expect("current exists");
                    cur.builder.exit_container()?;
                    container_open = false;
                }
                self.walk_section(current, Some(&sec_ctx), sub, child_depth)?;
                continue;
            }

            // Re-derive scope state after a mid-flow storyline switch.
            let cur_seq = current.as_ref().expect("current exists").seq;
            if cur_seq != seen_seq {
                seen_seq = cur_seq;
                let root = current.as_ref().expect("current exists").root_ctx.clone();
                sec_ctx = root.push_block(self.registry, "div", &[String::from("section")]);
            }
            let cur = current.as_mut().expect("current exists");
            if !container_open {
                self.open_section_container(cur, suppress_margins, &sec_ctx);
                container_open = true;
            }
            self.flow_item(cur, &sec_ctx, item)?;
        }

        if container_open {
            let cur = current.as_mut().expect("current exists");
            cur.builder.exit_container()?;
        }
        Ok(())
    }

    fn open_section_container(
        &mut self,
        cur: &mut Current,
        suppress_margins: bool,
        sec_ctx: &StyleContext,
    ) {
        cur.builder
            .enter_container(ContainerKind::Section, ContainerFlags::default());
        if !suppress_margins {
            let (top, bottom) = self.class_margins(sec_ctx, "section");
            cur.builder.set_container_margins(top, bottom);
        }
    }

    // --- Titles ---

    fn add_title(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        title: &Title,
        depth: usize,
    ) -> Result<(), BuildError> {
        let (wrapper_class, header_base, level) = title_classes(depth, cur.root_depth);

        cur.builder
            .start_block(ctx.style_spec("div", std::slice::from_ref(&wrapper_class)));
        let block_ctx = ctx.push_block(self.registry, "div", std::slice::from_ref(&wrapper_class));

        if depth == 1 {
            if let Some(vignette) = self.options.chapter_vignette_top.clone() {
                let style = block_ctx.resolve(
                    self.registry,
                    "img",
                    &[String::from("vignette-top")],
                );
                cur.builder
                    .add_image(vignette, StyleSlot::Resolved(style), None);
            }
        }

        if title.has_inline_images() {
            self.title_as_paragraphs(cur, &block_ctx, title, &header_base)?;
        } else {
            self.title_as_heading(cur, &block_ctx, title, &header_base, level)?;
        }

        if depth == 1 {
            if let Some(vignette) = self.options.chapter_vignette_bottom.clone() {
                let style = block_ctx.resolve(
                    self.registry,
                    "img",
                    &[String::from("vignette-bottom")],
                );
                cur.builder
                    .add_image(vignette, StyleSlot::Resolved(style), None);
            }
        }

        cur.builder.end_block(&block_ctx)
    }

    /// The single-entry title path: all paragraphs collapse into one
    /// heading entry with structural newlines between them.
    fn title_as_heading(
        &mut self,
        cur: &mut Current,
        block_ctx: &StyleContext,
        title: &Title,
        header_base: &str,
        level: u8,
    ) -> Result<(), BuildError> {
        let mut walker = InlineWalker::new(self.registry, block_ctx, self.footnotes, true, vec![]);
        let mut first = true;
        for item in &title.items {
            match item {
                TitleItem::Paragraph(p) => {
                    if !first {
                        let offset = walker.rune_count();
                        walker.write_raw('\n');
                        walker.class_event(offset, 1, &[format!("{header_base}-break")]);
                    }
                    let start = walker.rune_count();
                    walker.walk(&p.segments);
                    let end = walker.rune_count();
                    if end > start {
                        let class = if first {
                            format!("{header_base}-first")
                        } else {
                            format!("{header_base}-next")
                        };
                        walker.class_event(start, end - start, &[class]);
                    }
                    first = false;
                }
                TitleItem::EmptyLine => {
                    let offset = walker.rune_count();
                    walker.write_raw('\n');
                    walker.class_event(offset, 1, &[format!("{header_base}-emptyline")]);
                }
            }
        }
        let out = walker.finish();
        let total = out.text.chars().count();
        let mut events = segment_events(out.events);

        let base_props = parse_declarations("line-height: 1.0101lh")?;
        let base_name =
            self.registry
                .register_resolved(base_props, "heading-line", UsageKind::Inline, true);
        events = fill_style_event_gaps(events, total, &base_name);

        let (blob, offset) = self.accumulator.add(&out.text);
        let style = block_ctx.resolve(
            self.registry,
            &format!("h{level}"),
            &[header_base.to_string()],
        );
        cur.builder
            .add_content_with_heading(blob, offset, StyleSlot::Resolved(style), events, level);
        Ok(())
    }

    /// Fallback for titles with inline images: one paragraph entry per
    /// title paragraph.
    fn title_as_paragraphs(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        title: &Title,
        header_base: &str,
    ) -> Result<(), BuildError> {
        let mut first = true;
        for item in &title.items {
            match item {
                TitleItem::Paragraph(p) => {
                    let class = if first {
                        format!("{header_base}-first")
                    } else {
                        format!("{header_base}-next")
                    };
                    self.add_paragraph(cur, ctx, p, ParaOpts::heading(vec![class]))?;
                    first = false;
                }
                TitleItem::EmptyLine => self.empty_line(cur, ctx),
            }
        }
        Ok(())
    }

    // --- Flow items ---

    fn flow_item(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        item: &FlowItem,
    ) -> Result<(), BuildError> {
        match item {
            FlowItem::Paragraph(p) => self.add_paragraph(cur, ctx, p, ParaOpts::default()),
            FlowItem::Subtitle(p) => {
                self.add_paragraph(cur, ctx, p, ParaOpts::plain(vec!["subtitle".into()]))
            }
            FlowItem::EmptyLine => {
                self.empty_line(cur, ctx);
                Ok(())
            }
            FlowItem::Poem(poem) => self.poem(cur, ctx, poem),
            FlowItem::Cite(cite) => self.cite(cur, ctx, cite),
            FlowItem::Table(table) => self.table(cur, ctx, table),
            FlowItem::Image(image) => {
                self.flow_image(cur, ctx, image);
                Ok(())
            }
            FlowItem::Section(_) => Err(BuildError::Invariant(
                "nested sections are handled by the section walk".into(),
            )),
        }
    }

    fn empty_line(&mut self, cur: &mut Current, ctx: &StyleContext) {
        let margin = self.empty_line_margin(ctx);
        if cur.builder.previous_entry_type() != Some(EntryType::Image) {
            cur.builder.mark_previous_entry_strip_mb();
        }
        cur.builder.set_pending_empty_line_margin_top(margin.value);
        ctx.set_empty_line_margin(margin);
    }

    fn empty_line_margin(&mut self, ctx: &StyleContext) -> Dim {
        ctx.resolve_property(self.registry, "div", &[String::from("empty-line")], sym::MARGIN_TOP)
            .and_then(|v| v.as_dim())
            .unwrap_or(Dim::lh(1.0))
    }

    fn flow_image(&mut self, cur: &mut Current, ctx: &StyleContext, image: &Image) {
        let Some(resource) = resource_from_href(&image.href) else {
            log::warn!("dropping image with unresolvable href '{}'", image.href);
            return;
        };

        if cur.builder.has_pending_empty_line() {
            let margin = cur
                .builder
                .take_pending_empty_line_margin_top()
                .unwrap_or(1.0);
            ctx.take_empty_line_margin();
            if cur.builder.previous_entry_type() == Some(EntryType::Image) {
                // image, empty line, image: an explicit spacer keeps the gap.
                let mut props = bindery_style::StyleProps::new();
                props.insert(sym::MARGIN_TOP, PropValue::Dim(Dim::lh(margin)));
                let style = self.registry.register_resolved(
                    props,
                    "empty-line",
                    UsageKind::Wrapper,
                    true,
                );
                cur.builder.add_empty_line_spacer(style);
            } else {
                cur.builder.set_previous_entry_empty_line_margin_bottom(margin);
            }
        }

        let style = self.block_image_style(&resource);
        cur.builder
            .add_image(resource, StyleSlot::Resolved(style), image.alt.clone());
    }

    fn block_image_style(&mut self, resource: &ResourceName) -> String {
        let width = self
            .options
            .image_sizes
            .get(resource.as_str())
            .map(|(w, _)| *w)
            .unwrap_or(self.options.screen_width);
        self.registry
            .resolve_image_style(width, self.options.screen_width)
    }

    fn inline_image_style(&mut self, resource: &ResourceName) -> String {
        let (w, h) = self
            .options
            .image_sizes
            .get(resource.as_str())
            .copied()
            .unwrap_or((16.0, 16.0));
        self.registry.resolve_inline_image_style(w, h)
    }

    fn add_paragraph(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        para: &Paragraph,
        opts: ParaOpts,
    ) -> Result<(), BuildError> {
        let mut classes: Vec<String> = Vec::new();
        if let Some(style) = &para.style {
            classes.push(style.clone());
        }
        classes.extend(opts.classes.iter().cloned());
        let chain = spanning_style_chain(&para.segments).unwrap_or_default();
        classes.extend(chain.iter().cloned());

        let mut walker = InlineWalker::new(
            self.registry,
            ctx,
            self.footnotes,
            opts.heading_context,
            chain,
        );
        walker.walk(&para.segments);
        let out = walker.finish();

        // Remember where each footnote was first referenced from.
        if !out.note_refs.is_empty() {
            let anchor = para
                .id
                .clone()
                .map(AnchorId::from)
                .unwrap_or_else(|| AnchorId::from(cur.builder.section_name()));
            for note in &out.note_refs {
                self.backlinks.entry(note.clone()).or_insert_with(|| anchor.clone());
            }
        }

        ctx.take_empty_line_margin();

        let mut events = out.events;
        if !opts.heading_context && !out.has_images && !out.text.is_empty() {
            let dropcap = ctx
                .resolve_property(self.registry, "p", &classes, sym::DROPCAP)
                == Some(PropValue::Bool(true));
            if dropcap {
                let glyph = ctx.resolve_dropcap_glyph_delta(self.registry, &classes);
                if !glyph.is_empty() {
                    events.push(StyleEvent::new(0, 1, glyph));
                }
            }
        }
        let events = segment_events(events);

        if out.has_images {
            let image_only = out
                .chunks
                .iter()
                .all(|chunk| matches!(chunk, InlineChunk::Image { .. }));
            if image_only {
                // An image-only paragraph has no text entry to attach to:
                // inside a heading line it renders inline, in body flow it
                // becomes an ordinary block image.
                for chunk in out.chunks {
                    let InlineChunk::Image { resource, alt } = chunk else {
                        continue;
                    };
                    if opts.heading_context {
                        let style = self.inline_image_style(&resource);
                        cur.builder
                            .add_inline_image(resource, StyleSlot::Resolved(style), alt);
                    } else {
                        let style = self.block_image_style(&resource);
                        cur.builder
                            .add_image(resource, StyleSlot::Resolved(style), alt);
                    }
                }
                return Ok(());
            }

            let parts = out
                .chunks
                .into_iter()
                .map(|chunk| match chunk {
                    InlineChunk::Text(text) => MixedPart::Text(text),
                    InlineChunk::Image { resource, alt } => {
                        let style = self.inline_image_style(&resource);
                        MixedPart::Image {
                            resource,
                            style,
                            alt,
                        }
                    }
                })
                .collect();
            cur.builder.add_mixed_content(
                StyleSlot::Deferred(ctx.style_spec("p", &classes)),
                parts,
                events,
                None,
            );
            return Ok(());
        }

        let (blob, offset) = self.accumulator.add(&out.text);
        let style = StyleSlot::Deferred(ctx.style_spec("p", &classes));
        if opts.footnote {
            cur.builder
                .add_footnote_content_and_events(blob, offset, style, events);
        } else {
            cur.builder
                .add_content_and_events(EntryType::Text, blob, offset, style, events);
        }
        Ok(())
    }

    // --- Containers ---

    fn class_margins(&mut self, ctx: &StyleContext, class: &str) -> (Option<Dim>, Option<Dim>) {
        let classes = [class.to_string()];
        let top = ctx
            .resolve_property(self.registry, "div", &classes, sym::MARGIN_TOP)
            .and_then(|v| v.as_dim());
        let bottom = ctx
            .resolve_property(self.registry, "div", &classes, sym::MARGIN_BOTTOM)
            .and_then(|v| v.as_dim());
        (top, bottom)
    }

    fn epigraph(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        epigraph: &Epigraph,
    ) -> Result<(), BuildError> {
        cur.builder.enter_container(
            ContainerKind::Epigraph,
            ContainerFlags {
                transfer_mb_to_last_child: true,
                ..ContainerFlags::default()
            },
        );
        let inner = ctx.push_block(self.registry, "div", &[String::from("epigraph")]);
        let margins = self.class_margins(&inner, "epigraph");
        cur.builder.set_container_margins(margins.0, margins.1);
        for item in &epigraph.items {
            self.flow_item(cur, &inner, item)?;
        }
        for author in &epigraph.text_authors {
            self.add_paragraph(cur, &inner, author, ParaOpts::plain(vec!["text-author".into()]))?;
        }
        cur.builder.exit_container()
    }

    fn cite(&mut self, cur: &mut Current, ctx: &StyleContext, cite: &Cite) -> Result<(), BuildError> {
        cur.builder.enter_container(
            ContainerKind::Cite,
            ContainerFlags {
                transfer_mb_to_last_child: true,
                ..ContainerFlags::default()
            },
        );
        let inner = ctx.push_block(self.registry, "div", &[String::from("cite")]);
        let margins = self.class_margins(&inner, "cite");
        cur.builder.set_container_margins(margins.0, margins.1);
        for item in &cite.items {
            self.flow_item(cur, &inner, item)?;
        }
        for author in &cite.text_authors {
            self.add_paragraph(cur, &inner, author, ParaOpts::plain(vec!["text-author".into()]))?;
        }
        cur.builder.exit_container()
    }

    fn poem(&mut self, cur: &mut Current, ctx: &StyleContext, poem: &Poem) -> Result<(), BuildError> {
        cur.builder
            .enter_container(ContainerKind::Poem, ContainerFlags::default());
        let poem_ctx = ctx.push_block(self.registry, "div", &[String::from("poem")]);
        let margins = self.class_margins(&poem_ctx, "poem");
        cur.builder.set_container_margins(margins.0, margins.1);

        if let Some(title) = &poem.title {
            self.title_as_paragraphs_with_class(cur, &poem_ctx, title, "poem-title")?;
        }
        for epigraph in &poem.epigraphs {
            self.epigraph(cur, &poem_ctx, epigraph)?;
        }
        for subtitle in &poem.subtitles {
            self.add_paragraph(cur, &poem_ctx, subtitle, ParaOpts::plain(vec!["poem-subtitle".into()]))?;
        }
        for stanza in &poem.stanzas {
            cur.builder.enter_container(
                ContainerKind::Stanza,
                ContainerFlags {
                    transfer_mb_to_last_child: true,
                    strip_middle_margin_bottom: true,
                    ..ContainerFlags::default()
                },
            );
            let stanza_ctx = poem_ctx.push_block(self.registry, "div", &[String::from("stanza")]);
            let margins = self.class_margins(&stanza_ctx, "stanza");
            cur.builder.set_container_margins(margins.0, margins.1);
            if let Some(title) = &stanza.title {
                self.title_as_paragraphs_with_class(cur, &stanza_ctx, title, "stanza-title")?;
            }
            if let Some(subtitle) = &stanza.subtitle {
                self.add_paragraph(
                    cur,
                    &stanza_ctx,
                    subtitle,
                    ParaOpts::plain(vec!["stanza-subtitle".into()]),
                )?;
            }
            for verse in &stanza.verses {
                self.add_paragraph(cur, &stanza_ctx, verse, ParaOpts::plain(vec!["verse".into()]))?;
            }
            cur.builder.exit_container()?;
        }
        for author in &poem.text_authors {
            self.add_paragraph(cur, &poem_ctx, author, ParaOpts::plain(vec!["text-author".into()]))?;
        }
        if let Some(date) = &poem.date {
            self.add_paragraph(cur, &poem_ctx, date, ParaOpts::plain(vec!["date".into()]))?;
        }
        cur.builder.exit_container()
    }

    fn title_as_paragraphs_with_class(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        title: &Title,
        class: &str,
    ) -> Result<(), BuildError> {
        for item in &title.items {
            match item {
                TitleItem::Paragraph(p) => {
                    self.add_paragraph(cur, ctx, p, ParaOpts::plain(vec![class.to_string()]))?;
                }
                TitleItem::EmptyLine => self.empty_line(cur, ctx),
            }
        }
        Ok(())
    }

    fn annotation_block(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        annotation: &Annotation,
    ) -> Result<(), BuildError> {
        cur.builder
            .enter_container(ContainerKind::Annotation, ContainerFlags::default());
        let inner = ctx.push_block(self.registry, "div", &[String::from("annotation")]);
        let margins = self.class_margins(&inner, "annotation");
        cur.builder.set_container_margins(margins.0, margins.1);
        for item in &annotation.items {
            self.flow_item(cur, &inner, item)?;
        }
        cur.builder.exit_container()
    }

    // --- Tables ---

    fn table(&mut self, cur: &mut Current, ctx: &StyleContext, table: &Table) -> Result<(), BuildError> {
        let table_eid = cur.builder.alloc_eid();
        let body_eid = cur.builder.alloc_eid();

        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let row_eid = cur.builder.alloc_eid();
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                cells.push(self.table_cell(cur, ctx, cell)?);
            }
            let mut row_entry =
                ContentEntry::new(row_eid, EntryType::TableRow, EntryContent::None, StyleSlot::none());
            row_entry.children = cells;
            rows.push(row_entry);
        }

        let mut body_entry = ContentEntry::new(
            body_eid,
            EntryType::TableBody,
            EntryContent::None,
            StyleSlot::none(),
        );
        body_entry.children = rows;

        let mut table_entry = ContentEntry::new(
            table_eid,
            EntryType::Table,
            EntryContent::None,
            StyleSlot::Deferred(ctx.style_spec("table", &[])),
        );
        table_entry.children = vec![body_entry];
        cur.builder.add_raw_entry(table_entry);
        Ok(())
    }

    fn table_cell(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        cell: &TableCell,
    ) -> Result<ContentEntry, BuildError> {
        let tag = if cell.header { "th" } else { "td" };
        let align = cell.align.map(|a| match a {
            bindery_idf::CellAlign::Left => sym::LEFT,
            bindery_idf::CellAlign::Center => sym::CENTER,
            bindery_idf::CellAlign::Right => sym::RIGHT,
        });

        let mut props = ctx.cascade(self.registry, tag, &[]);
        if let Some(align) = align {
            props.insert(sym::TEXT_ALIGN, PropValue::symbol(align));
        }
        let cell_style = self
            .registry
            .register_resolved(props, tag, UsageKind::Wrapper, true);

        let cell_eid = cur.builder.alloc_eid();
        let mut cell_entry = ContentEntry::new(
            cell_eid,
            EntryType::Container,
            EntryContent::None,
            StyleSlot::Resolved(cell_style),
        );
        cell_entry.cell = Some(CellExtras {
            align,
            colspan: cell.colspan.max(1),
            rowspan: cell.rowspan.max(1),
        });

        let cell_ctx = ctx.push(self.registry, tag, &[]);
        let mut walker = InlineWalker::new(self.registry, &cell_ctx, self.footnotes, false, vec![]);
        walker.walk(&cell.content);
        let out = walker.finish();

        if out.has_images {
            let only_images = out
                .chunks
                .iter()
                .all(|c| matches!(c, InlineChunk::Image { .. }));
            if only_images {
                for chunk in out.chunks {
                    if let InlineChunk::Image { resource, alt } = chunk {
                        let style = self.block_image_style(&resource);
                        let eid = cur.builder.alloc_eid();
                        let mut image = ContentEntry::new(
                            eid,
                            EntryType::Image,
                            EntryContent::Resource(resource),
                            StyleSlot::Resolved(style),
                        );
                        image.alt_text = alt;
                        cell_entry.children.push(image);
                    }
                }
            } else {
                let text_eid = cur.builder.alloc_eid();
                let items = out
                    .chunks
                    .into_iter()
                    .map(|chunk| match chunk {
                        InlineChunk::Text(text) => crate::entry::MixedItem::Text(text),
                        InlineChunk::Image { resource, alt } => {
                            let style = self.inline_image_style(&resource);
                            crate::entry::MixedItem::Image {
                                eid: cur.builder.alloc_eid(),
                                resource,
                                style,
                                alt,
                            }
                        }
                    })
                    .collect();
                let mut text_entry = ContentEntry::new(
                    text_eid,
                    EntryType::Text,
                    EntryContent::Mixed(items),
                    StyleSlot::Resolved(cell_ctx.resolve(self.registry, "p", &[])),
                );
                text_entry.style_events = segment_events(out.events);
                cell_entry.children.push(text_entry);
            }
        } else if !out.text.is_empty() {
            let (blob, offset) = self.accumulator.add(&out.text);
            let mut text_entry = ContentEntry::new(
                cur.builder.alloc_eid(),
                EntryType::Text,
                EntryContent::Blob { name: blob, offset },
                StyleSlot::Resolved(cell_ctx.resolve(self.registry, "p", &[])),
            );
            text_entry.style_events = segment_events(out.events);
            cell_entry.children.push(text_entry);
        }
        Ok(cell_entry)
    }

    // --- Footnotes ---

    fn footnote_section(&mut self, section: &Section) -> Result<(), BuildError> {
        let mut cur = self.new_storyline(1);
        cur.builder.enter_container(
            ContainerKind::Footnote,
            ContainerFlags {
                transfer_mb_to_last_child: true,
                ..ContainerFlags::default()
            },
        );
        let ctx = cur
            .root_ctx
            .clone()
            .push_block(self.registry, "div", &[String::from("footnote")]);
        let margins = self.class_margins(&ctx, "footnote");
        cur.builder.set_container_margins(margins.0, margins.1);

        if let Some(title) = &section.title {
            self.title_as_paragraphs_with_class(&mut cur, &ctx, title, "footnote-title")?;
        }
        for epigraph in &section.epigraphs {
            self.epigraph(&mut cur, &ctx, epigraph)?;
        }
        if let Some(image) = &section.image {
            self.flow_image(&mut cur, &ctx, image);
        }
        if let Some(annotation) = &section.annotation {
            self.annotation_block(&mut cur, &ctx, annotation)?;
        }

        let paragraph_count = section
            .content
            .iter()
            .filter(|i| matches!(i, FlowItem::Paragraph(_)))
            .count();
        let mut first_paragraph = true;
        for item in &section.content {
            match item {
                FlowItem::Paragraph(p) => {
                    let mut para = p.clone();
                    if first_paragraph && paragraph_count > 1 {
                        if let Some(indicator) = self.more_paragraphs_indicator() {
                            para.segments.insert(
                                0,
                                InlineSegment::named(
                                    "footnote-more",
                                    vec![InlineSegment::text(indicator)],
                                ),
                            );
                        }
                    }
                    first_paragraph = false;
                    self.add_paragraph(&mut cur, &ctx, &para, ParaOpts::footnote())?;
                }
                other => self.flow_item(&mut cur, &ctx, other)?,
            }
        }

        // Backlink to the first referencing location.
        if let Some(anchor) = section
            .id
            .as_deref()
            .and_then(|id| self.backlinks.get(id).cloned())
        {
            let backlink = Paragraph {
                id: None,
                style: None,
                segments: vec![InlineSegment::link(
                    format!("#{anchor}"),
                    vec![InlineSegment::text("\u{21a9}")],
                )],
            };
            self.add_paragraph(
                &mut cur,
                &ctx,
                &backlink,
                ParaOpts::plain(vec!["footnote-backlink".into()]),
            )?;
        }

        cur.builder.exit_container()?;
        self.finish_storyline(cur)
    }

    /// The indicator text comes from the `footnote-more` base style's
    /// content property; absence means the indicator is hidden.
    fn more_paragraphs_indicator(&self) -> Option<String> {
        let def = self.registry.get("footnote-more")?;
        match def.props.get(&sym::CONTENT) {
            Some(PropValue::Str(text)) => Some(text.clone()),
            _ => None,
        }
    }

    // --- Generated sections ---

    fn emit_cover(&mut self, cover: &Image) -> Result<(), BuildError> {
        let Some(resource) = resource_from_href(&cover.href) else {
            log::warn!("cover image href '{}' does not resolve; skipped", cover.href);
            return Ok(());
        };
        let (width, height) = self
            .options
            .image_sizes
            .get(resource.as_str())
            .copied()
            .unwrap_or((600.0, 800.0));
        self.emit_cover_resource(resource, width, height, cover.alt.clone())
    }

    fn emit_cover_resource(
        &mut self,
        resource: ResourceName,
        width: f64,
        height: f64,
        alt: Option<String>,
    ) -> Result<(), BuildError> {
        let mut cur = self.new_storyline(1);
        let style = self
            .registry
            .resolve_image_style(width, width.max(1.0));
        cur.builder
            .add_image(resource, StyleSlot::Resolved(style), alt);

        let template = ValueMap::new()
            .set(sym::ID, Value::Int(cur.builder.page_template_eid() as i64))
            .set(sym::TYPE, Value::sym(sym::CONTAINER))
            .set(sym::LAYOUT, Value::sym(sym::SCALE_FIT))
            .set(sym::FLOAT, Value::sym(sym::CENTER))
            .set(sym::WIDTH, Value::Int(width as i64))
            .set(sym::HEIGHT, Value::Int(height as i64))
            .set(sym::STORY_NAME, Value::symbol(cur.builder.name()))
            .build();
        let section = cur.builder.section_fragment(template);

        self.next_eid = cur.builder.next_free_eid();
        let storyline = cur.builder.build_storyline_only(self.registry)?;
        self.fragments.push(storyline)?;
        self.fragments.push(section)?;
        Ok(())
    }

    fn annotation_page(&mut self, annotation: &Annotation) -> Result<(), BuildError> {
        let mut cur = self.new_storyline(1);
        let ctx = cur.root_ctx.clone();
        self.annotation_block(&mut cur, &ctx, annotation)?;
        self.finish_storyline(cur)
    }

    fn toc_page(&mut self) -> Result<(), BuildError> {
        let mut cur = self.new_storyline(1);
        let ctx = cur.root_ctx.clone();

        let toc = std::mem::take(&mut self.toc);
        let top_style = ctx.resolve(self.registry, "ol", &[String::from("toc-list")]);
        let min_depth = toc.iter().map(|t| t.depth).min().unwrap_or(1);
        let list = self.build_toc_list(&mut cur, &ctx, &toc, min_depth, Some(top_style));
        cur.builder.add_raw_entry(list);
        self.toc = toc;

        self.finish_storyline(cur)
    }

    /// Builds one `<ol>` level: items at `depth`, each taking the deeper
    /// entries that follow it as a nested list.
    fn build_toc_list(
        &mut self,
        cur: &mut Current,
        ctx: &StyleContext,
        entries: &[TocItem],
        depth: usize,
        top_style: Option<String>,
    ) -> ContentEntry {
        let style = match top_style {
            Some(name) => name,
            None => ctx.resolve(self.registry, "ol", &[]),
        };
        let mut list = ContentEntry::new(
            cur.builder.alloc_eid(),
            EntryType::List,
            EntryContent::None,
            StyleSlot::Resolved(style),
        );

        let mut i = 0;
        while i < entries.len() {
            let item = &entries[i];
            if item.depth > depth {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < entries.len() && entries[j].depth > depth {
                j += 1;
            }

            let mut list_item = ContentEntry::new(
                cur.builder.alloc_eid(),
                EntryType::ListItem,
                EntryContent::None,
                StyleSlot::Resolved(ctx.resolve(self.registry, "li", &[String::from("toc-item")])),
            );

            let (blob, offset) = self.accumulator.add(&item.title);
            let mut text_entry = ContentEntry::new(
                cur.builder.alloc_eid(),
                EntryType::Text,
                EntryContent::Blob { name: blob, offset },
                StyleSlot::Resolved(ctx.resolve(self.registry, "p", &[String::from("toc-item")])),
            );
            let style = ctx.resolve_inline(self.registry, &[String::from("toc-item")]);
            text_entry.style_events = vec![StyleEvent {
                offset: 0,
                length: item.title.chars().count(),
                style,
                link_to: Some(AnchorId::from(item.section_name.as_str())),
                footnote: false,
            }];
            list_item.children.push(text_entry);

            if j > i + 1 {
                let nested = self.build_toc_list(cur, ctx, &entries[i + 1..j], depth + 1, None);
                list_item.children.push(nested);
            }
            list.children.push(list_item);
            i = j;
        }
        list
    }
}

#[derive(Debug, Default)]
struct ParaOpts {
    classes: Vec<String>,
    /// Title-fallback paragraphs: event styles resolve as deltas and
    /// image-only paragraphs render their images inline.
    heading_context: bool,
    footnote: bool,
}

impl ParaOpts {
    fn plain(classes: Vec<String>) -> Self {
        Self {
            classes,
            ..Self::default()
        }
    }

    fn heading(classes: Vec<String>) -> Self {
        Self {
            classes,
            heading_context: true,
            ..Self::default()
        }
    }

    fn footnote() -> Self {
        Self {
            footnote: true,
            ..Self::default()
        }
    }
}

fn title_classes(depth: usize, root_depth: usize) -> (String, String, u8) {
    if depth <= 1 {
        return (
            "chapter-title".to_string(),
            "chapter-title-header".to_string(),
            1,
        );
    }
    let wrapper = if depth == 2 && root_depth == 2 {
        "section-title".to_string()
    } else if depth == root_depth {
        "section-title".to_string()
    } else {
        let n = (depth.saturating_sub(root_depth) + 2).clamp(2, 6);
        format!("section-title--h{n}")
    };
    let level = depth.min(6) as u8;
    (wrapper, "section-title-header".to_string(), level)
}

fn title_text(title: &Title) -> String {
    fn segment_text(seg: &InlineSegment, out: &mut String) {
        if !seg.text.is_empty() {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            out.push_str(seg.text.trim());
        }
        for child in &seg.children {
            segment_text(child, out);
        }
    }
    let mut out = String::new();
    for item in &title.items {
        if let TitleItem::Paragraph(p) = item {
            for seg in &p.segments {
                segment_text(seg, &mut out);
            }
        }
    }
    out.trim().to_string()
}

fn section_is_spacer_only(section: &Section) -> bool {
    if section.title.is_some() || section.annotation.is_some() || !section.epigraphs.is_empty() {
        return false;
    }
    let mut saw_image = section.image.is_some();
    for item in &section.content {
        match item {
            FlowItem::Image(_) => saw_image = true,
            FlowItem::EmptyLine => {}
            _ => return false,
        }
    }
    saw_image
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_section_numbers() {
        assert_eq!(to_base36(1), "1");
        assert_eq!(to_base36(9), "9");
        assert_eq!(to_base36(10), "a");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn title_class_mapping() {
        assert_eq!(title_classes(1, 1).0, "chapter-title");
        assert_eq!(title_classes(2, 2).0, "section-title");
        assert_eq!(title_classes(3, 2).0, "section-title--h3");
        assert_eq!(title_classes(8, 2).0, "section-title--h6");
        assert_eq!(title_classes(3, 2).2, 3);
        assert_eq!(title_classes(9, 1).2, 6);
    }

    #[test]
    fn spacer_only_sections_are_detected() {
        let section = Section {
            content: vec![
                FlowItem::Image(Image {
                    href: "#pic".into(),
                    ..Default::default()
                }),
                FlowItem::EmptyLine,
            ],
            ..Default::default()
        };
        assert!(section_is_spacer_only(&section));

        let with_text = Section {
            content: vec![FlowItem::Paragraph(Paragraph::plain("text"))],
            ..Default::default()
        };
        assert!(!section_is_spacer_only(&with_text));
    }
}
