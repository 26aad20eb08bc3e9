mod common;

use common::fixtures::*;
use common::*;
use bindery::PublicationOptions;
use bindery_idf::{
    CellAlign, FlowItem, FootnoteIndex, Image, InlineSegment, Table, TableCell, TableRow,
};
use bindery_types::{sym, Value};

fn table_book(table: Table) -> bindery_idf::Book {
    book_of(vec![section(Some("T"), vec![FlowItem::Table(table)])])
}

fn entry_type<'v>(entry: &'v EntryMap) -> Option<&'v str> {
    entry.get(&sym::TYPE).and_then(Value::as_symbol)
}

#[test]
fn table_scaffolding_nests_body_rows_and_cells() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = Table {
        id: None,
        rows: vec![
            TableRow {
                cells: vec![
                    TableCell {
                        header: true,
                        content: vec![InlineSegment::text("Name")],
                        ..Default::default()
                    },
                    TableCell {
                        header: true,
                        content: vec![InlineSegment::text("Value")],
                        ..Default::default()
                    },
                ],
            },
            TableRow {
                cells: vec![
                    TableCell {
                        content: vec![InlineSegment::text("alpha")],
                        ..Default::default()
                    },
                    TableCell {
                        content: vec![InlineSegment::text("1")],
                        ..Default::default()
                    },
                ],
            },
        ],
    };
    let mut registry = test_registry();
    let fragments = build_default(&table_book(table), &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);

    assert_eq!(all.iter().filter(|e| entry_type(e) == Some("table")).count(), 1);
    assert_eq!(
        all.iter().filter(|e| entry_type(e) == Some("table_body")).count(),
        1
    );
    assert_eq!(
        all.iter().filter(|e| entry_type(e) == Some("table_row")).count(),
        2
    );
    // Four cells, each a container with one nested text entry.
    let cells: Vec<_> = all
        .iter()
        .filter(|e| entry_type(e) == Some("container") && e.get(&sym::CONTENT_LIST).is_some())
        .collect();
    assert_eq!(cells.len(), 4);

    // Header cells resolve through the th defaults (bold, centered).
    let th_style = all
        .iter()
        .filter(|e| entry_type(e) == Some("container"))
        .filter_map(|e| entry_style(e))
        .find(|s| s.starts_with("th"))
        .expect("th-styled cell");
    let props = registry.registered_props(th_style).unwrap();
    assert!(props.contains_key(&sym::FONT_WEIGHT));
    Ok(())
}

#[test]
fn cell_alignment_and_spans_are_respected() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = Table {
        id: None,
        rows: vec![TableRow {
            cells: vec![TableCell {
                header: false,
                align: Some(CellAlign::Right),
                colspan: 2,
                rowspan: 3,
                content: vec![InlineSegment::text("wide")],
            }],
        }],
    };
    let mut registry = test_registry();
    let fragments = build_default(&table_book(table), &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let cell = all
        .iter()
        .find(|e| e.get(&sym::COLSPAN).is_some())
        .expect("spanning cell");
    assert_eq!(cell.get(&sym::COLSPAN).and_then(Value::as_int), Some(2));
    assert_eq!(cell.get(&sym::ROWSPAN).and_then(Value::as_int), Some(3));
    assert_eq!(
        cell.get(&sym::TEXT_ALIGN).and_then(Value::as_symbol),
        Some("right")
    );

    // The alignment also overrides the cell style's text-align.
    let props = registry
        .registered_props(entry_style(cell).unwrap())
        .unwrap();
    assert_eq!(
        props.get(&sym::TEXT_ALIGN),
        Some(&bindery_style::PropValue::symbol(bindery_types::sym::RIGHT))
    );
    Ok(())
}

#[test]
fn image_only_cells_emit_image_entries_directly() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = Table {
        id: None,
        rows: vec![TableRow {
            cells: vec![TableCell {
                content: vec![InlineSegment::inline_image(Image {
                    href: "#chart".into(),
                    ..Default::default()
                })],
                ..Default::default()
            }],
        }],
    };
    let mut registry = test_registry();
    let options = PublicationOptions::builder()
        .annotation_page(false)
        .toc_page(false)
        .image_size("chart", 316.0, 200.0)
        .build();
    let fragments = bindery::build_publication(
        &table_book(table),
        &FootnoteIndex::new(),
        &mut registry,
        &options,
    )?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let image = all
        .iter()
        .find(|e| entry_type(e) == Some("image"))
        .expect("image entry inside the cell");
    assert_eq!(
        image.get(&sym::RESOURCE_NAME).and_then(Value::as_symbol),
        Some("chart")
    );
    // Sized as a width ratio of the screen (316 / 1264).
    let props = registry
        .registered_props(entry_style(image).unwrap())
        .unwrap();
    let width = props
        .get(&sym::WIDTH)
        .and_then(bindery_style::PropValue::as_dim)
        .unwrap();
    assert!((width.value - 0.25).abs() < 1e-9);
    Ok(())
}

#[test]
fn mixed_cells_use_mixed_content() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = Table {
        id: None,
        rows: vec![TableRow {
            cells: vec![TableCell {
                content: vec![
                    InlineSegment::text("figure "),
                    InlineSegment::inline_image(Image {
                        href: "#fig".into(),
                        ..Default::default()
                    }),
                ],
                ..Default::default()
            }],
        }],
    };
    let mut registry = test_registry();
    let fragments = build_default(&table_book(table), &mut registry)?;

    let storyline = fragments.get(sym::STORYLINE, "l1").unwrap();
    let all = flatten_entries(storyline);
    let text = all
        .iter()
        .find(|e| {
            entry_type(e) == Some("text")
                && e.get(&sym::CONTENT_LIST)
                    .and_then(Value::as_list)
                    .is_some_and(|l| l.iter().any(|v| v.as_str().is_some()))
        })
        .expect("mixed text entry");
    let list = text.get(&sym::CONTENT_LIST).and_then(Value::as_list).unwrap();
    assert_eq!(list[0].as_str(), Some("figure "));
    let image = list[1].as_map().expect("inline image item");
    assert_eq!(
        image.get(&sym::RENDER).and_then(Value::as_symbol),
        Some("inline")
    );
    assert_eq!(
        image.get(&sym::RESOURCE_NAME).and_then(Value::as_symbol),
        Some("fig")
    );
    Ok(())
}
