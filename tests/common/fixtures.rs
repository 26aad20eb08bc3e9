use bindery_idf::{
    Body, Book, FlowItem, InlineSegment, Paragraph, Poem, Section, Stanza, Title,
};
use bindery_style::{parse_declarations, StyleDefinition, StyleRegistry};

/// A registry seeded the way the stylesheet collaborator would seed it.
pub fn test_registry() -> StyleRegistry {
    let styles: &[(&str, &str)] = &[
        ("strong", "font-weight: bold"),
        ("emphasis", "font-style: italic"),
        ("strikethrough", "text-decoration: line-through"),
        ("code", "white-space: pre"),
        ("sub", "font-size: 0.75em; baseline-shift: -0.25em"),
        ("sup", "font-size: 0.75em; baseline-shift: 0.35em"),
        ("small", "font-size: 0.8em"),
        ("empty-line", "margin-top: 1.5lh"),
        ("poem", "margin-left: 2em; margin-top: 1lh; margin-bottom: 1lh"),
        ("stanza", "margin-top: 0.75lh; margin-bottom: 0.75lh"),
        ("verse", "text-align: left; text-indent: 0em"),
        ("epigraph", "margin-left: 15%; font-style: italic; margin-bottom: 1lh"),
        ("cite", "margin-left: 1.5em; margin-bottom: 1lh"),
        ("text-author", "text-align: right; font-style: italic"),
        ("subtitle", "text-align: center; font-weight: bold"),
        ("chapter-title-header-first", "font-size: 1.6em"),
        ("chapter-title-header-next", "font-size: 1.2em"),
        ("footnote-title", "font-weight: bold"),
        ("link-footnote", "color: #0000ee"),
        ("link-internal", "color: #0000ee"),
        ("link-external", "color: #0000ee; text-decoration: underline"),
        ("toc-list", "margin-left: 1em"),
        ("toc-item", "color: #222222"),
    ];
    let mut registry = StyleRegistry::new();
    for (name, decls) in styles {
        registry.insert_base(
            *name,
            StyleDefinition::new(parse_declarations(decls).expect("fixture style parses")),
        );
    }
    registry
}

pub fn paragraph(text: &str) -> FlowItem {
    FlowItem::Paragraph(Paragraph::plain(text))
}

pub fn section(title: Option<&str>, content: Vec<FlowItem>) -> Section {
    Section {
        title: title.map(Title::plain),
        content,
        ..Default::default()
    }
}

pub fn book_of(sections: Vec<Section>) -> Book {
    Book {
        bodies: vec![Body {
            sections,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// One titled chapter with plain paragraphs.
pub fn simple_book(title: &str, paragraphs: &[&str]) -> Book {
    book_of(vec![section(
        Some(title),
        paragraphs.iter().map(|p| paragraph(p)).collect(),
    )])
}

/// A poem of `stanzas` stanzas with `verses` verses each.
pub fn poem_of(stanzas: usize, verses: usize) -> Poem {
    Poem {
        stanzas: (0..stanzas)
            .map(|s| Stanza {
                verses: (0..verses)
                    .map(|v| Paragraph::plain(format!("Stanza {s} verse {v}")))
                    .collect(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// `<em>italic <strong>bold</strong> tail</em>` as an inline tree.
pub fn nested_emphasis_paragraph() -> Paragraph {
    Paragraph {
        id: None,
        style: None,
        segments: vec![InlineSegment {
            kind: bindery_idf::InlineKind::Emphasis,
            text: "italic ".into(),
            style: None,
            href: None,
            image: None,
            children: vec![
                InlineSegment::strong(vec![InlineSegment::text("bold")]),
                InlineSegment::text(" tail"),
            ],
        }],
    }
}
