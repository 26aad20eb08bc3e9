//! The parsed source-document tree.
//!
//! This is the in-memory representation the parser collaborator hands to
//! the storyline engine: a FictionBook-like hierarchy of bodies, sections,
//! flow items and inline segments. Class names stay raw strings here; the
//! engine resolves them against the style registry.

use std::collections::HashSet;

/// A whole publication source: one or more bodies plus book-level extras.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub bodies: Vec<Body>,
    /// Cover image reference, when the source carries one.
    pub cover: Option<Image>,
    /// Book annotation, rendered onto the generated annotation page.
    pub annotation: Option<Annotation>,
}

/// A reading body. Bodies named after the footnote convention (`notes`,
/// `comments`) hold footnote targets rather than main-flow content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub name: Option<String>,
    pub title: Option<Title>,
    pub epigraphs: Vec<Epigraph>,
    pub image: Option<Image>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub id: Option<String>,
    pub title: Option<Title>,
    pub image: Option<Image>,
    pub annotation: Option<Annotation>,
    pub epigraphs: Vec<Epigraph>,
    pub content: Vec<FlowItem>,
}

/// A title block: paragraphs optionally separated by empty lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Title {
    pub items: Vec<TitleItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TitleItem {
    Paragraph(Paragraph),
    EmptyLine,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub id: Option<String>,
    /// Optional named style from the source markup.
    pub style: Option<String>,
    pub segments: Vec<InlineSegment>,
}

/// One item of block-level flow inside a section or container.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowItem {
    Paragraph(Paragraph),
    Subtitle(Paragraph),
    EmptyLine,
    Poem(Poem),
    Cite(Cite),
    Table(Table),
    Image(Image),
    Section(Section),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Poem {
    pub id: Option<String>,
    pub title: Option<Title>,
    pub epigraphs: Vec<Epigraph>,
    pub subtitles: Vec<Paragraph>,
    pub stanzas: Vec<Stanza>,
    pub text_authors: Vec<Paragraph>,
    pub date: Option<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stanza {
    pub title: Option<Title>,
    pub subtitle: Option<Paragraph>,
    pub verses: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cite {
    pub id: Option<String>,
    pub items: Vec<FlowItem>,
    pub text_authors: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Epigraph {
    pub items: Vec<FlowItem>,
    pub text_authors: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    pub items: Vec<FlowItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub id: Option<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableCell {
    pub header: bool,
    pub align: Option<CellAlign>,
    pub colspan: u32,
    pub rowspan: u32,
    pub content: Vec<InlineSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellAlign {
    Left,
    Center,
    Right,
}

/// An image reference; `href` points into the registered resources
/// (`#id` form for internal blobs).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Image {
    pub href: String,
    pub id: Option<String>,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    Text,
    Strong,
    Emphasis,
    Strikethrough,
    Sub,
    Sup,
    Code,
    NamedStyle,
    Link,
    InlineImage,
}

/// One node of a paragraph's inline tree.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineSegment {
    pub kind: InlineKind,
    pub text: String,
    /// Style name for `NamedStyle` segments.
    pub style: Option<String>,
    /// Link target for `Link` segments.
    pub href: Option<String>,
    /// Image payload for `InlineImage` segments.
    pub image: Option<Image>,
    pub children: Vec<InlineSegment>,
}

impl InlineSegment {
    fn of_kind(kind: InlineKind) -> Self {
        Self {
            kind,
            text: String::new(),
            style: None,
            href: None,
            image: None,
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::of_kind(InlineKind::Text)
        }
    }

    pub fn strong(children: Vec<InlineSegment>) -> Self {
        Self {
            children,
            ..Self::of_kind(InlineKind::Strong)
        }
    }

    pub fn emphasis(children: Vec<InlineSegment>) -> Self {
        Self {
            children,
            ..Self::of_kind(InlineKind::Emphasis)
        }
    }

    pub fn strikethrough(children: Vec<InlineSegment>) -> Self {
        Self {
            children,
            ..Self::of_kind(InlineKind::Strikethrough)
        }
    }

    pub fn sub(children: Vec<InlineSegment>) -> Self {
        Self {
            children,
            ..Self::of_kind(InlineKind::Sub)
        }
    }

    pub fn sup(children: Vec<InlineSegment>) -> Self {
        Self {
            children,
            ..Self::of_kind(InlineKind::Sup)
        }
    }

    pub fn code(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::of_kind(InlineKind::Code)
        }
    }

    pub fn named(style: impl Into<String>, children: Vec<InlineSegment>) -> Self {
        Self {
            style: Some(style.into()),
            children,
            ..Self::of_kind(InlineKind::NamedStyle)
        }
    }

    pub fn link(href: impl Into<String>, children: Vec<InlineSegment>) -> Self {
        Self {
            href: Some(href.into()),
            children,
            ..Self::of_kind(InlineKind::Link)
        }
    }

    pub fn inline_image(image: Image) -> Self {
        Self {
            image: Some(image),
            ..Self::of_kind(InlineKind::InlineImage)
        }
    }
}

impl Paragraph {
    /// A paragraph holding a single plain-text segment.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            id: None,
            style: None,
            segments: vec![InlineSegment::text(text)],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Title {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            items: vec![TitleItem::Paragraph(Paragraph::plain(text))],
        }
    }

    /// True when any title paragraph contains an inline image anywhere in
    /// its segment tree.
    pub fn has_inline_images(&self) -> bool {
        fn segment_has_image(seg: &InlineSegment) -> bool {
            seg.kind == InlineKind::InlineImage || seg.children.iter().any(segment_has_image)
        }
        self.items.iter().any(|item| match item {
            TitleItem::Paragraph(p) => p.segments.iter().any(segment_has_image),
            TitleItem::EmptyLine => false,
        })
    }
}

/// The ids that resolve to internal footnote targets.
pub type FootnoteIndex = HashSet<String>;
