//! The build-time post-processing pass: deferred style resolution with
//! position filtering, CSS margin collapsing over the persistent container
//! topology, empty-line margin application, and style re-registration.

use crate::entry::{ContentEntry, EntryType, StyleSlot};
use crate::error::BuildError;
use crate::storyline::{ContainerInfo, ROOT_CONTAINER};
use bindery_style::{spec_hint, Dim, PropValue, StyleContext, StyleProps, StyleRegistry, UsageKind};
use bindery_types::sym;
use itertools::Itertools;
use std::collections::HashMap;

pub fn postprocess(
    entries: &mut Vec<ContentEntry>,
    containers: &mut HashMap<u32, ContainerInfo>,
    registry: &mut StyleRegistry,
) -> Result<(), BuildError> {
    resolve_deferred(entries, registry)?;
    capture_margins(entries, registry);
    collapse(entries, containers);
    apply_empty_line(entries);
    reregister(entries, registry);
    Ok(())
}

fn usage_for(entry_type: EntryType) -> UsageKind {
    match entry_type {
        EntryType::Text => UsageKind::Text,
        EntryType::Image => UsageKind::Image,
        _ => UsageKind::Wrapper,
    }
}

fn cascade_spec(
    ctx: &StyleContext,
    registry: &mut StyleRegistry,
    spec: &str,
) -> (StyleProps, String) {
    let mut tokens = spec.split_whitespace();
    let tag = tokens.next().unwrap_or("p");
    let classes: Vec<String> = tokens.map(str::to_string).collect();
    let props = ctx.cascade(registry, tag, &classes);
    (props, spec_hint(tag, &classes))
}

/// Steps 1 and 2: top-level deferred specs resolve against a fresh
/// containerless context (top-level content is never fragmented, so it
/// keeps all its margins); wrapper children resolve against the wrapper's
/// captured context with position-based margin filtering.
fn resolve_deferred(
    entries: &mut [ContentEntry],
    registry: &mut StyleRegistry,
) -> Result<(), BuildError> {
    for entry in entries.iter_mut() {
        if let StyleSlot::Deferred(spec) = &entry.style {
            let fresh = StyleContext::root();
            let (props, hint) = cascade_spec(&fresh, registry, spec);
            let name = registry.register_resolved(props, &hint, usage_for(entry.entry_type), true);
            entry.style = StyleSlot::Resolved(name);
        }
        resolve_wrapper_children(entry, registry)?;
    }
    Ok(())
}

fn resolve_wrapper_children(
    entry: &mut ContentEntry,
    registry: &mut StyleRegistry,
) -> Result<(), BuildError> {
    if entry.children.is_empty() {
        return Ok(());
    }
    let has_deferred = entry
        .children
        .iter()
        .any(|c| matches!(c.style, StyleSlot::Deferred(_)));
    if has_deferred {
        let ctx = entry.wrapper_ctx.clone().ok_or_else(|| {
            BuildError::Invariant("wrapper lacks its style context at resolution time".into())
        })?;
        let count = entry.children.len();
        for (i, child) in entry.children.iter_mut().enumerate() {
            if let StyleSlot::Deferred(spec) = &child.style {
                let (mut props, hint) = cascade_spec(&ctx, registry, spec);
                // First loses margin-top, last loses margin-bottom, middle
                // loses both; a single child keeps both.
                if count > 1 {
                    if i == 0 {
                        props.remove(&sym::MARGIN_TOP);
                    }
                    if i + 1 == count {
                        props.remove(&sym::MARGIN_BOTTOM);
                    }
                    if i != 0 && i + 1 != count {
                        props.remove(&sym::MARGIN_TOP);
                        props.remove(&sym::MARGIN_BOTTOM);
                    }
                }
                let usage = if child.entry_type == EntryType::Image {
                    // Images take no line-height from the surrounding text.
                    props.remove(&sym::LINE_HEIGHT);
                    UsageKind::Image
                } else {
                    usage_for(child.entry_type)
                };
                let name = registry.register_resolved(props, &hint, usage, true);
                child.style = StyleSlot::Resolved(name);
            }
        }
    }
    for child in entry.children.iter_mut() {
        resolve_wrapper_children(child, registry)?;
    }
    Ok(())
}

/// Step 3: read the final vertical margins of every entry from its
/// registered style so the collapsing pass can work numerically.
fn capture_margins(entries: &mut [ContentEntry], registry: &StyleRegistry) {
    for entry in entries.iter_mut() {
        if let Some(name) = entry.style.resolved_name() {
            if let Some(props) = registry.registered_props(name) {
                entry.margin_top = props.get(&sym::MARGIN_TOP).and_then(PropValue::as_dim);
                entry.margin_bottom = props.get(&sym::MARGIN_BOTTOM).and_then(PropValue::as_dim);
            }
        }
        capture_margins(&mut entry.children, registry);
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Entry(usize),
    Container(u32),
}

/// Compatible margins take the larger; an incomparable incoming value wins.
fn max_margin(a: Option<Dim>, b: Option<Dim>) -> Option<Dim> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.try_max(b).unwrap_or(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Step 4: CSS margin collapsing over the container hierarchy. Containers
/// transfer their margins to their first/last entries per their flags, then
/// sibling gaps become `max(A.mb, B.mt)` carried entirely by B.
fn collapse(entries: &mut [ContentEntry], containers: &HashMap<u32, ContainerInfo>) {
    strip_marked(entries);

    let mut children: HashMap<u32, Vec<(u32, Node)>> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        children
            .entry(entry.container_id)
            .or_default()
            .push((entry.order, Node::Entry(idx)));
    }
    for (&id, info) in containers {
        if id != ROOT_CONTAINER {
            children
                .entry(info.parent)
                .or_default()
                .push((info.order, Node::Container(id)));
        }
    }
    for list in children.values_mut() {
        list.sort_by_key(|(order, _)| *order);
    }

    collapse_container(ROOT_CONTAINER, entries, containers, &children);
}

fn strip_marked(entries: &mut [ContentEntry]) {
    for entry in entries.iter_mut() {
        if entry.strip_margin_bottom {
            entry.margin_bottom = Some(Dim::lh(0.0));
        }
        strip_marked(&mut entry.children);
    }
}

fn first_entry_idx(
    node: Node,
    children: &HashMap<u32, Vec<(u32, Node)>>,
) -> Option<usize> {
    match node {
        Node::Entry(idx) => Some(idx),
        Node::Container(id) => children
            .get(&id)?
            .first()
            .and_then(|(_, kid)| first_entry_idx(*kid, children)),
    }
}

fn last_entry_idx(
    node: Node,
    children: &HashMap<u32, Vec<(u32, Node)>>,
) -> Option<usize> {
    match node {
        Node::Entry(idx) => Some(idx),
        Node::Container(id) => children
            .get(&id)?
            .last()
            .and_then(|(_, kid)| last_entry_idx(*kid, children)),
    }
}

fn collapse_container(
    cid: u32,
    entries: &mut [ContentEntry],
    containers: &HashMap<u32, ContainerInfo>,
    children: &HashMap<u32, Vec<(u32, Node)>>,
) {
    let kids: Vec<Node> = children
        .get(&cid)
        .map(|list| list.iter().map(|(_, n)| *n).collect())
        .unwrap_or_default();
    if kids.is_empty() {
        return;
    }

    if cid != ROOT_CONTAINER {
        let info = &containers[&cid];
        if info.flags.title_block_mode {
            for kid in &kids[1..] {
                if let Some(idx) = first_entry_idx(*kid, children) {
                    entries[idx].margin_top = max_margin(entries[idx].margin_top, info.margin_top);
                }
            }
        } else if let Some(idx) = first_entry_idx(kids[0], children) {
            entries[idx].margin_top = max_margin(entries[idx].margin_top, info.margin_top);
        }

        let last = *kids.last().expect("kids is non-empty");
        if let Some(idx) = last_entry_idx(last, children) {
            if info.flags.force_transfer_mb_to_last_child {
                if info.margin_bottom.is_some() {
                    entries[idx].margin_bottom = info.margin_bottom;
                }
            } else if info.flags.transfer_mb_to_last_child {
                entries[idx].margin_bottom =
                    max_margin(entries[idx].margin_bottom, info.margin_bottom);
            }
        }

        if info.flags.strip_middle_margin_bottom {
            for kid in &kids[..kids.len() - 1] {
                if let Some(idx) = last_entry_idx(*kid, children) {
                    entries[idx].margin_bottom = Some(Dim::lh(0.0));
                }
            }
        }
    }

    for kid in &kids {
        if let Node::Container(id) = kid {
            collapse_container(*id, entries, containers, children);
        }
    }

    // Sibling collapsing between plain entries: the visible gap becomes
    // max(A.mb, B.mt), carried entirely by B. Container boundaries keep
    // the margins their transfer flags produced.
    for (a, b) in kids.iter().tuple_windows() {
        let (Node::Entry(a_idx), Node::Entry(b_idx)) = (*a, *b) else {
            continue;
        };
        let gap = max_margin(entries[a_idx].margin_bottom, entries[b_idx].margin_top);
        entries[a_idx].margin_bottom = Some(Dim::lh(0.0));
        entries[b_idx].margin_top = gap;
    }
}

/// Step 5: empty-line carry-over wins over everything collapsing decided.
fn apply_empty_line(entries: &mut [ContentEntry]) {
    for entry in entries.iter_mut() {
        if let Some(lh) = entry.empty_line_margin_top {
            entry.margin_top = Some(Dim::lh(lh));
        }
        if let Some(lh) = entry.empty_line_margin_bottom {
            entry.margin_bottom = Some(Dim::lh(lh));
        }
        apply_empty_line(&mut entry.children);
    }
}

/// Step 6: entries whose margins changed re-register their bag under the
/// old name as hint; the registry deduplicates identical outcomes.
fn reregister(entries: &mut [ContentEntry], registry: &mut StyleRegistry) {
    for entry in entries.iter_mut() {
        reregister_entry(entry, registry);
        reregister(&mut entry.children, registry);
    }
}

fn reregister_entry(entry: &mut ContentEntry, registry: &mut StyleRegistry) {
    let Some(name) = entry.style.resolved_name() else {
        return;
    };
    if name.is_empty() {
        return;
    }
    let Some(props) = registry.registered_props(name) else {
        return;
    };
    let current_top = props.get(&sym::MARGIN_TOP).and_then(PropValue::as_dim);
    let current_bottom = props.get(&sym::MARGIN_BOTTOM).and_then(PropValue::as_dim);
    if current_top == entry.margin_top && current_bottom == entry.margin_bottom {
        return;
    }

    let mut bag = props.clone();
    match entry.margin_top {
        Some(dim) => {
            bag.insert(sym::MARGIN_TOP, PropValue::Dim(dim));
        }
        None => {
            bag.remove(&sym::MARGIN_TOP);
        }
    }
    match entry.margin_bottom {
        Some(dim) => {
            bag.insert(sym::MARGIN_BOTTOM, PropValue::Dim(dim));
        }
        None => {
            bag.remove(&sym::MARGIN_BOTTOM);
        }
    }
    let hint = name.to_string();
    let new_name = registry.register_resolved(bag, &hint, usage_for(entry.entry_type), true);
    entry.style = StyleSlot::Resolved(new_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ContentEntry, EntryContent};
    use crate::storyline::{ContainerFlags, ContainerKind};
    use bindery_style::parse_declarations;

    fn registry_with_style(
        registry: &mut StyleRegistry,
        hint: &str,
        decls: &str,
    ) -> String {
        let props = parse_declarations(decls).unwrap();
        registry.register_resolved(props, hint, UsageKind::Text, true)
    }

    fn entry(eid: u32, style: &str, container: u32, order: u32) -> ContentEntry {
        let mut e = ContentEntry::new(
            eid,
            EntryType::Text,
            EntryContent::Blob {
                name: "content_1".into(),
                offset: 0,
            },
            StyleSlot::Resolved(style.into()),
        );
        e.container_id = container;
        e.order = order;
        e
    }

    fn root_only() -> HashMap<u32, ContainerInfo> {
        let mut map = HashMap::new();
        map.insert(
            ROOT_CONTAINER,
            ContainerInfo {
                parent: ROOT_CONTAINER,
                kind: ContainerKind::Root,
                flags: ContainerFlags::default(),
                order: 0,
                margin_top: None,
                margin_bottom: None,
            },
        );
        map
    }

    fn margins_of(registry: &StyleRegistry, entry: &ContentEntry) -> (Option<Dim>, Option<Dim>) {
        let props = registry
            .registered_props(entry.style.resolved_name().unwrap())
            .unwrap();
        (
            props.get(&sym::MARGIN_TOP).and_then(PropValue::as_dim),
            props.get(&sym::MARGIN_BOTTOM).and_then(PropValue::as_dim),
        )
    }

    #[test]
    fn sibling_gap_becomes_max_and_moves_to_the_follower() {
        let mut registry = StyleRegistry::new();
        let a = registry_with_style(&mut registry, "a", "margin-bottom: 2lh");
        let b = registry_with_style(&mut registry, "b", "margin-top: 1lh");
        let mut entries = vec![entry(1, &a, ROOT_CONTAINER, 1), entry(2, &b, ROOT_CONTAINER, 2)];
        let mut containers = root_only();

        postprocess(&mut entries, &mut containers, &mut registry).unwrap();

        assert_eq!(margins_of(&registry, &entries[0]).1, Some(Dim::lh(0.0)));
        assert_eq!(margins_of(&registry, &entries[1]).0, Some(Dim::lh(2.0)));
    }

    #[test]
    fn strip_flag_zeroes_margin_bottom_before_collapsing() {
        let mut registry = StyleRegistry::new();
        let a = registry_with_style(&mut registry, "a2", "margin-bottom: 2lh");
        let mut first = entry(1, &a, ROOT_CONTAINER, 1);
        first.strip_margin_bottom = true;
        let b = registry_with_style(&mut registry, "b2", "margin-top: 0.5lh");
        let mut entries = vec![first, entry(2, &b, ROOT_CONTAINER, 2)];
        let mut containers = root_only();

        postprocess(&mut entries, &mut containers, &mut registry).unwrap();

        assert_eq!(margins_of(&registry, &entries[0]).1, Some(Dim::lh(0.0)));
        // The stripped margin no longer feeds the sibling gap.
        assert_eq!(margins_of(&registry, &entries[1]).0, Some(Dim::lh(0.5)));
    }

    #[test]
    fn force_transfer_assigns_even_a_smaller_container_margin() {
        let mut registry = StyleRegistry::new();
        let child = registry_with_style(&mut registry, "verse-x", "margin-bottom: 2lh");
        let mut entries = vec![entry(1, &child, 1, 2)];
        let mut containers = root_only();
        containers.insert(
            1,
            ContainerInfo {
                parent: ROOT_CONTAINER,
                kind: ContainerKind::Stanza,
                flags: ContainerFlags {
                    force_transfer_mb_to_last_child: true,
                    ..ContainerFlags::default()
                },
                order: 1,
                margin_top: None,
                margin_bottom: Some(Dim::lh(0.25)),
            },
        );

        postprocess(&mut entries, &mut containers, &mut registry).unwrap();
        assert_eq!(margins_of(&registry, &entries[0]).1, Some(Dim::lh(0.25)));
    }

    #[test]
    fn empty_line_margin_wins_over_collapsing() {
        let mut registry = StyleRegistry::new();
        let a = registry_with_style(&mut registry, "a3", "margin-bottom: 2lh");
        let b = registry_with_style(&mut registry, "b3", "margin-top: 1lh");
        let mut second = entry(2, &b, ROOT_CONTAINER, 2);
        second.empty_line_margin_top = Some(1.5);
        let mut entries = vec![entry(1, &a, ROOT_CONTAINER, 1), second];
        let mut containers = root_only();

        postprocess(&mut entries, &mut containers, &mut registry).unwrap();
        assert_eq!(margins_of(&registry, &entries[1]).0, Some(Dim::lh(1.5)));
    }

    #[test]
    fn wrapper_children_are_position_filtered() {
        let mut registry = StyleRegistry::new();
        registry.insert_base(
            "spaced",
            bindery_style::StyleDefinition::new(
                parse_declarations("margin-top: 1lh; margin-bottom: 1lh").unwrap(),
            ),
        );
        let mut wrapper = ContentEntry::new(
            1,
            EntryType::Container,
            EntryContent::None,
            StyleSlot::Resolved(String::new()),
        );
        wrapper.wrapper_ctx = Some(StyleContext::root());
        for (eid, order) in [(2, 2), (3, 3), (4, 4)] {
            let mut child = ContentEntry::new(
                eid,
                EntryType::Text,
                EntryContent::Blob {
                    name: "content_1".into(),
                    offset: 0,
                },
                StyleSlot::Deferred("p spaced".into()),
            );
            child.order = order;
            wrapper.children.push(child);
        }
        let mut entries = vec![wrapper];
        let mut containers = root_only();

        postprocess(&mut entries, &mut containers, &mut registry).unwrap();

        let kids = &entries[0].children;
        assert_eq!(margins_of(&registry, &kids[0]), (None, Some(Dim::lh(1.0))));
        assert_eq!(margins_of(&registry, &kids[1]), (None, None));
        assert_eq!(margins_of(&registry, &kids[2]), (Some(Dim::lh(1.0)), None));
    }

    #[test]
    fn wrapper_without_context_is_fatal() {
        let mut registry = StyleRegistry::new();
        let mut wrapper = ContentEntry::new(
            1,
            EntryType::Container,
            EntryContent::None,
            StyleSlot::Resolved(String::new()),
        );
        wrapper.children.push(ContentEntry::new(
            2,
            EntryType::Text,
            EntryContent::Blob {
                name: "content_1".into(),
                offset: 0,
            },
            StyleSlot::Deferred("p".into()),
        ));
        let mut entries = vec![wrapper];
        let mut containers = root_only();

        let err = postprocess(&mut entries, &mut containers, &mut registry);
        assert!(matches!(err, Err(BuildError::Invariant(_))));
    }
}
