mod common;

use common::fixtures::*;
use common::*;
use bindery_idf::{FlowItem, Image};
use bindery_style::Dim;
use bindery_types::{sym, Value};

#[test]
fn empty_line_moves_margin_from_previous_to_next() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let book = book_of(vec![section(
        Some("T"),
        vec![
            paragraph("First paragraph."),
            FlowItem::EmptyLine,
            paragraph("Second paragraph."),
        ],
    )]);
    let mut registry = test_registry();
    let fragments = build_default(&book, &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let p1 = all
        .iter()
        .find(|e| entry_content_ref(e).is_some_and(|(_, o)| o == 1))
        .expect("first paragraph");
    let p2 = all
        .iter()
        .find(|e| entry_content_ref(e).is_some_and(|(_, o)| o == 2))
        .expect("second paragraph");

    let (_, p1_bottom) = final_margins(&registry, p1);
    assert_eq!(p1_bottom, Some(Dim::lh(0.0)));
    // The empty-line style's margin (1.5lh in the fixture registry) lands
    // on the follower's margin-top, whatever collapsing decided.
    let (p2_top, _) = final_margins(&registry, p2);
    assert_eq!(p2_top, Some(Dim::lh(1.5)));
    Ok(())
}

#[test]
fn stanza_margins_follow_container_flags() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let book = book_of(vec![section(
        Some("T"),
        vec![FlowItem::Poem(poem_of(2, 2))],
    )]);
    let mut registry = test_registry();
    let fragments = build_default(&book, &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let verse = |offset: usize| {
        *all.iter()
            .find(|e| entry_content_ref(e).is_some_and(|(_, o)| o == offset))
            .expect("verse entry")
    };

    // Bucket offsets: 0 = title, 1..=4 = the four verses.
    for (middle, last) in [(1, 2), (3, 4)] {
        let (_, middle_bottom) = final_margins(&registry, verse(middle));
        assert_eq!(middle_bottom, Some(Dim::lh(0.0)), "middle verse keeps no mb");
        let (_, last_bottom) = final_margins(&registry, verse(last));
        // TransferMBToLastChild hands the stanza's margin-bottom down.
        assert_eq!(last_bottom, Some(Dim::lh(0.75)));
    }
    Ok(())
}

#[test]
fn verses_inherit_the_poem_indent() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let book = book_of(vec![section(
        Some("T"),
        vec![FlowItem::Poem(poem_of(1, 1))],
    )]);
    let mut registry = test_registry();
    let fragments = build_default(&book, &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let verse = all
        .iter()
        .find(|e| entry_style(e).is_some_and(|s| s.contains("verse")))
        .expect("verse entry");
    let props = registry
        .registered_props(entry_style(verse).unwrap())
        .unwrap();
    // The poem's 2em indent survives the p tag's zero default margin.
    assert_eq!(
        props.get(&sym::MARGIN_LEFT).and_then(bindery_style::PropValue::as_dim),
        Some(Dim::em(2.0))
    );
    Ok(())
}

#[test]
fn image_empty_line_image_emits_a_spacer() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let image = |name: &str| {
        FlowItem::Image(Image {
            href: format!("#{name}"),
            ..Default::default()
        })
    };
    let book = book_of(vec![section(
        Some("T"),
        vec![image("one"), FlowItem::EmptyLine, image("two")],
    )]);
    let mut registry = test_registry();
    let fragments = build_default(&book, &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let spacer = all
        .iter()
        .find(|e| {
            e.get(&sym::TYPE).and_then(Value::as_symbol) == Some("container")
                && entry_style(e).is_some_and(|s| s.contains("empty-line"))
        })
        .expect("explicit spacer container");
    let props = registry
        .registered_props(entry_style(spacer).unwrap())
        .unwrap();
    assert_eq!(
        props.get(&sym::MARGIN_TOP).and_then(bindery_style::PropValue::as_dim),
        Some(Dim::lh(1.5))
    );

    let images: Vec<_> = all
        .iter()
        .filter(|e| e.get(&sym::TYPE).and_then(Value::as_symbol) == Some("image"))
        .collect();
    assert_eq!(images.len(), 2);
    Ok(())
}

#[test]
fn empty_line_before_image_lands_on_previous_entry() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let book = book_of(vec![section(
        Some("T"),
        vec![
            paragraph("Before."),
            FlowItem::EmptyLine,
            FlowItem::Image(Image {
                href: "#pic".into(),
                ..Default::default()
            }),
        ],
    )]);
    let mut registry = test_registry();
    let fragments = build_default(&book, &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let before = all
        .iter()
        .find(|e| entry_content_ref(e).is_some_and(|(_, o)| o == 1))
        .expect("paragraph before the image");
    // The margin moved onto the previous entry as margin-bottom.
    let (_, bottom) = final_margins(&registry, before);
    assert_eq!(bottom, Some(Dim::lh(1.5)));
    Ok(())
}
