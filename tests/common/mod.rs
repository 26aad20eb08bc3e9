pub mod fixtures;

use bindery::{build_publication, BuildError, Fragment, FragmentList, PublicationOptions};
use bindery_idf::{Book, FootnoteIndex};
use bindery_style::StyleRegistry;
use bindery_types::{sym, Sym, Value};
use std::collections::BTreeMap;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Scenario tests disable the generated pages unless they test them.
pub fn base_options() -> PublicationOptions {
    PublicationOptions::builder()
        .annotation_page(false)
        .toc_page(false)
        .build()
}

pub fn build_default(
    book: &Book,
    registry: &mut StyleRegistry,
) -> Result<FragmentList, BuildError> {
    build_publication(book, &FootnoteIndex::new(), registry, &base_options())
}

pub type EntryMap = BTreeMap<Sym, Value>;

/// Top-level entry maps of a storyline fragment.
pub fn storyline_entries(fragment: &Fragment) -> Vec<&EntryMap> {
    fragment
        .value
        .as_map()
        .and_then(|m| m.get(&sym::CONTENT_LIST))
        .and_then(Value::as_list)
        .map(|list| list.iter().filter_map(Value::as_map).collect())
        .unwrap_or_default()
}

/// Every entry map in a storyline, depth-first, wrappers before children.
pub fn flatten_entries(fragment: &Fragment) -> Vec<&EntryMap> {
    fn walk<'v>(value: &'v Value, out: &mut Vec<&'v EntryMap>) {
        let Some(map) = value.as_map() else { return };
        out.push(map);
        if let Some(children) = map.get(&sym::CONTENT_LIST).and_then(Value::as_list) {
            for child in children {
                walk(child, out);
            }
        }
    }
    let mut out = Vec::new();
    if let Some(list) = fragment
        .value
        .as_map()
        .and_then(|m| m.get(&sym::CONTENT_LIST))
        .and_then(Value::as_list)
    {
        for entry in list {
            walk(entry, &mut out);
        }
    }
    out
}

pub fn entry_style<'v>(entry: &'v EntryMap) -> Option<&'v str> {
    entry.get(&sym::STYLE).and_then(Value::as_symbol)
}

pub fn entry_events<'v>(entry: &'v EntryMap) -> Vec<&'v EntryMap> {
    entry
        .get(&sym::STYLE_EVENTS)
        .and_then(Value::as_list)
        .map(|list| list.iter().filter_map(Value::as_map).collect())
        .unwrap_or_default()
}

/// The `(bucket, offset)` back-reference of a text entry.
pub fn entry_content_ref<'v>(entry: &'v EntryMap) -> Option<(&'v str, usize)> {
    let content = entry.get(&sym::CONTENT)?.as_map()?;
    let name = content.get(&sym::NAME)?.as_symbol()?;
    let offset = content.get(&sym::OFFSET)?.as_int()?;
    Some((name, offset as usize))
}

/// The strings of a content bucket fragment.
pub fn bucket_strings(fragment: &Fragment) -> Vec<&str> {
    fragment
        .value
        .as_map()
        .and_then(|m| m.get(&sym::CONTENT_LIST))
        .and_then(Value::as_list)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Looks a final margin up through the style the entry ended with.
pub fn final_margins(
    registry: &StyleRegistry,
    entry: &EntryMap,
) -> (Option<bindery_style::Dim>, Option<bindery_style::Dim>) {
    let name = entry_style(entry).expect("entry has a style");
    let props = registry
        .registered_props(name)
        .expect("style is registered");
    (
        props
            .get(&sym::MARGIN_TOP)
            .and_then(bindery_style::PropValue::as_dim),
        props
            .get(&sym::MARGIN_BOTTOM)
            .and_then(bindery_style::PropValue::as_dim),
    )
}
