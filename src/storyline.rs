//! Accumulates styled content entries for one storyline and emits its
//! storyline and section fragments.
//!
//! The builder tracks three kinds of structure: the flat entry list, the
//! wrapper-block stack (nested container entries with deferred styles), and
//! the margin-collapsing container topology, which persists after
//! `exit_container` so the post-processing pass can reconstruct siblings.

use crate::entry::{ContentEntry, EntryContent, EntryType, MixedItem, StyleSlot};
use crate::error::BuildError;
use crate::events::StyleEvent;
use crate::fragment::Fragment;
use crate::margins;
use bindery_style::{Dim, StyleContext, StyleRegistry};
use bindery_types::{sym, ResourceName, Value, ValueMap};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerFlags {
    /// The container's margin-bottom moves onto its last child.
    pub transfer_mb_to_last_child: bool,
    /// Same, but assigned even when the child's own margin is larger.
    pub force_transfer_mb_to_last_child: bool,
    /// All children but the last lose their margin-bottom.
    pub strip_middle_margin_bottom: bool,
    /// Title blocks shift the container's top spacing onto the non-first
    /// children instead of the first.
    pub title_block_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Root,
    Section,
    Annotation,
    Epigraph,
    Cite,
    Poem,
    Stanza,
    Footnote,
}

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub parent: u32,
    pub kind: ContainerKind,
    pub flags: ContainerFlags,
    pub order: u32,
    pub margin_top: Option<Dim>,
    pub margin_bottom: Option<Dim>,
}

/// One member of a mixed content list before EID assignment.
#[derive(Debug, Clone)]
pub enum MixedPart {
    Text(String),
    Image {
        resource: ResourceName,
        style: String,
        alt: Option<String>,
    },
}

#[derive(Debug)]
struct WrapperFrame {
    entry: ContentEntry,
}

#[derive(Debug)]
pub struct StorylineBuilder {
    name: String,
    section_name: String,
    page_template_eid: u32,
    next_eid: u32,
    entries: Vec<ContentEntry>,
    block_stack: Vec<WrapperFrame>,
    container_stack: Vec<u32>,
    containers: HashMap<u32, ContainerInfo>,
    container_seq: u32,
    order_seq: u32,
    pending_empty_line_margin_top: Option<f64>,
}

pub const ROOT_CONTAINER: u32 = 0;

impl StorylineBuilder {
    /// `start_eid` is reserved for the page-template container; entries
    /// number from the next id up.
    pub fn new(name: impl Into<String>, section_name: impl Into<String>, start_eid: u32) -> Self {
        let mut containers = HashMap::new();
        containers.insert(
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
        Self {
            name: name.into(),
            section_name: section_name.into(),
            page_template_eid: start_eid,
            next_eid: start_eid + 1,
            entries: Vec::new(),
            block_stack: Vec::new(),
            container_stack: Vec::new(),
            containers,
            container_seq: 0,
            order_seq: 0,
            pending_empty_line_margin_top: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn section_name(&self) -> &str {
        &self.section_name
    }

    pub fn page_template_eid(&self) -> u32 {
        self.page_template_eid
    }

    /// The next EID the enclosing publication should hand to a subsequent
    /// storyline.
    pub fn next_free_eid(&self) -> u32 {
        self.next_eid
    }

    pub fn alloc_eid(&mut self) -> u32 {
        let eid = self.next_eid;
        self.next_eid += 1;
        eid
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // --- Container topology ---

    pub fn enter_container(&mut self, kind: ContainerKind, flags: ContainerFlags) -> u32 {
        self.container_seq += 1;
        let id = self.container_seq;
        let parent = self.current_container();
        self.order_seq += 1;
        self.containers.insert(
            id,
            ContainerInfo {
                parent,
                kind,
                flags,
                order: self.order_seq,
                margin_top: None,
                margin_bottom: None,
            },
        );
        self.container_stack.push(id);
        id
    }

    pub fn exit_container(&mut self) -> Result<(), BuildError> {
        self.container_stack
            .pop()
            .map(|_| ())
            .ok_or_else(|| BuildError::Invariant("exit_container on an empty stack".into()))
    }

    pub fn set_container_margins(&mut self, top: Option<Dim>, bottom: Option<Dim>) {
        let id = self.current_container();
        if let Some(info) = self.containers.get_mut(&id) {
            info.margin_top = top;
            info.margin_bottom = bottom;
        }
    }

    fn current_container(&self) -> u32 {
        self.container_stack.last().copied().unwrap_or(ROOT_CONTAINER)
    }

    // --- Wrapper blocks ---

    pub fn start_block(&mut self, style_spec: String) {
        let entry = ContentEntry::new(
            self.alloc_eid(),
            EntryType::Container,
            EntryContent::None,
            StyleSlot::Deferred(style_spec),
        );
        self.block_stack.push(WrapperFrame { entry });
    }

    /// Closes the current wrapper. A wrapper that collected no children is
    /// discarded outright so the reader's position map never sees it.
    pub fn end_block(&mut self, ctx: &StyleContext) -> Result<(), BuildError> {
        let mut frame = self
            .block_stack
            .pop()
            .ok_or_else(|| BuildError::Invariant("end_block on an empty wrapper stack".into()))?;
        if frame.entry.children.is_empty() {
            log::debug!("discarding empty wrapper block");
            return Ok(());
        }
        frame.entry.wrapper_ctx = Some(ctx.clone());
        self.push_entry(frame.entry);
        Ok(())
    }

    fn push_entry(&mut self, mut entry: ContentEntry) {
        entry.container_id = self.current_container();
        self.order_seq += 1;
        entry.order = self.order_seq;
        match self.block_stack.last_mut() {
            Some(frame) => frame.entry.children.push(entry),
            None => self.entries.push(entry),
        }
    }

    fn current_list(&mut self) -> &mut Vec<ContentEntry> {
        match self.block_stack.last_mut() {
            Some(frame) => &mut frame.entry.children,
            None => &mut self.entries,
        }
    }

    // --- Content ---

    pub fn add_content(
        &mut self,
        entry_type: EntryType,
        blob_name: String,
        offset: usize,
        style: StyleSlot,
    ) {
        self.add_content_and_events(entry_type, blob_name, offset, style, Vec::new());
    }

    pub fn add_content_and_events(
        &mut self,
        entry_type: EntryType,
        blob_name: String,
        offset: usize,
        style: StyleSlot,
        events: Vec<StyleEvent>,
    ) {
        let mut entry = ContentEntry::new(
            self.alloc_eid(),
            entry_type,
            EntryContent::Blob {
                name: blob_name,
                offset,
            },
            style,
        );
        entry.style_events = events;
        entry.empty_line_margin_top = self.pending_empty_line_margin_top.take();
        self.push_entry(entry);
    }

    pub fn add_content_with_heading(
        &mut self,
        blob_name: String,
        offset: usize,
        style: StyleSlot,
        events: Vec<StyleEvent>,
        level: u8,
    ) {
        let mut entry = ContentEntry::new(
            self.alloc_eid(),
            EntryType::Text,
            EntryContent::Blob {
                name: blob_name,
                offset,
            },
            style,
        );
        entry.style_events = events;
        entry.heading_level = Some(level.min(6));
        entry.empty_line_margin_top = self.pending_empty_line_margin_top.take();
        self.push_entry(entry);
    }

    /// Footnote body content: carries the footer position and footnote
    /// classification markers into the emitted entry.
    pub fn add_footnote_content_and_events(
        &mut self,
        blob_name: String,
        offset: usize,
        style: StyleSlot,
        events: Vec<StyleEvent>,
    ) {
        let mut entry = ContentEntry::new(
            self.alloc_eid(),
            EntryType::Text,
            EntryContent::Blob {
                name: blob_name,
                offset,
            },
            style,
        );
        entry.style_events = events;
        entry.footnote_marker = true;
        entry.empty_line_margin_top = self.pending_empty_line_margin_top.take();
        self.push_entry(entry);
    }

    /// Interleaved text and inline images. The parent text entry takes one
    /// EID, then each image takes its own, in order.
    pub fn add_mixed_content(
        &mut self,
        style: StyleSlot,
        parts: Vec<MixedPart>,
        events: Vec<StyleEvent>,
        heading_level: Option<u8>,
    ) {
        let parent_eid = self.alloc_eid();
        let items: Vec<MixedItem> = parts
            .into_iter()
            .map(|part| match part {
                MixedPart::Text(text) => MixedItem::Text(text),
                MixedPart::Image {
                    resource,
                    style,
                    alt,
                } => MixedItem::Image {
                    eid: self.alloc_eid(),
                    resource,
                    style,
                    alt,
                },
            })
            .collect();
        let mut entry = ContentEntry::new(
            parent_eid,
            EntryType::Text,
            EntryContent::Mixed(items),
            style,
        );
        entry.style_events = events;
        entry.heading_level = heading_level.map(|l| l.min(6));
        entry.empty_line_margin_top = self.pending_empty_line_margin_top.take();
        self.push_entry(entry);
    }

    pub fn add_image(&mut self, resource: ResourceName, style: StyleSlot, alt: Option<String>) {
        let mut entry = ContentEntry::new(
            self.alloc_eid(),
            EntryType::Image,
            EntryContent::Resource(resource),
            style,
        );
        entry.alt_text = alt;
        entry.empty_line_margin_top = self.pending_empty_line_margin_top.take();
        self.push_entry(entry);
    }

    pub fn add_inline_image(&mut self, resource: ResourceName, style: StyleSlot, alt: Option<String>) {
        let mut entry = ContentEntry::new(
            self.alloc_eid(),
            EntryType::Image,
            EntryContent::Resource(resource),
            style,
        );
        entry.alt_text = alt;
        entry.render_inline = true;
        self.push_entry(entry);
    }

    /// An explicit spacer between two images separated by an empty line.
    pub fn add_empty_line_spacer(&mut self, style: String) {
        let entry = ContentEntry::new(
            self.alloc_eid(),
            EntryType::Container,
            EntryContent::None,
            StyleSlot::Resolved(style),
        );
        self.push_entry(entry);
    }

    /// A pre-built entry tree (tables, TOC lists). The caller allocates
    /// EIDs through [`StorylineBuilder::alloc_eid`] in DFS order.
    pub fn add_raw_entry(&mut self, entry: ContentEntry) {
        self.push_entry(entry);
    }

    // --- Entry fixups ---

    /// Flags the most recent entry so collapsing zeroes its margin-bottom.
    /// A no-op at storyline start.
    pub fn mark_previous_entry_strip_mb(&mut self) {
        if let Some(entry) = self.current_list().last_mut() {
            entry.strip_margin_bottom = true;
        }
    }

    pub fn set_previous_entry_empty_line_margin_bottom(&mut self, margin_lh: f64) {
        if let Some(entry) = self.current_list().last_mut() {
            entry.empty_line_margin_bottom = Some(margin_lh);
        }
    }

    pub fn previous_entry_type(&self) -> Option<EntryType> {
        let list = match self.block_stack.last() {
            Some(frame) => &frame.entry.children,
            None => &self.entries,
        };
        list.last().map(|e| e.entry_type)
    }

    pub fn set_pending_empty_line_margin_top(&mut self, margin_lh: f64) {
        self.pending_empty_line_margin_top = Some(margin_lh);
    }

    pub fn take_pending_empty_line_margin_top(&mut self) -> Option<f64> {
        self.pending_empty_line_margin_top.take()
    }

    pub fn has_pending_empty_line(&self) -> bool {
        self.pending_empty_line_margin_top.is_some()
    }

    // --- Output ---

    /// DFS enumeration of EIDs, page template first, wrappers before their
    /// children; the order the reader's position map validates against.
    pub fn all_eids(&self) -> Vec<u32> {
        let mut out = vec![self.page_template_eid];
        for entry in &self.entries {
            entry.collect_eids(&mut out);
        }
        out
    }

    /// Runs the build pipeline and emits the storyline plus its section
    /// fragment.
    pub fn build(mut self, registry: &mut StyleRegistry) -> Result<(Fragment, Fragment), BuildError> {
        if !self.block_stack.is_empty() {
            return Err(BuildError::Invariant(
                "storyline built with an open wrapper block".into(),
            ));
        }
        margins::postprocess(&mut self.entries, &mut self.containers, registry)?;

        let section = self.section_fragment(
            ValueMap::new()
                .set(sym::ID, Value::Int(self.page_template_eid as i64))
                .set(sym::TYPE, Value::sym(sym::TEXT))
                .set(sym::STORY_NAME, Value::symbol(&self.name))
                .build(),
        );
        Ok((self.storyline_fragment(), section))
    }

    /// Emits only the storyline; cover sections bind it through a
    /// container-typed page template the driver builds itself.
    pub fn build_storyline_only(
        mut self,
        registry: &mut StyleRegistry,
    ) -> Result<Fragment, BuildError> {
        if !self.block_stack.is_empty() {
            return Err(BuildError::Invariant(
                "storyline built with an open wrapper block".into(),
            ));
        }
        margins::postprocess(&mut self.entries, &mut self.containers, registry)?;
        Ok(self.storyline_fragment())
    }

    fn storyline_fragment(&self) -> Fragment {
        let content: Vec<Value> = self.entries.iter().map(ContentEntry::to_value).collect();
        Fragment {
            fragment_type: sym::STORYLINE,
            name: self.name.clone(),
            value: ValueMap::new()
                .set(sym::STORY_NAME, Value::symbol(&self.name))
                .set(sym::CONTENT_LIST, Value::List(content))
                .build(),
        }
    }

    pub fn section_fragment(&self, page_template: Value) -> Fragment {
        Fragment {
            fragment_type: sym::SECTION,
            name: self.section_name.clone(),
            value: ValueMap::new()
                .set(sym::SECTION_NAME, Value::symbol(&self.section_name))
                .set(sym::PAGE_TEMPLATES, Value::List(vec![page_template]))
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_style::StyleContext;

    fn builder() -> StorylineBuilder {
        StorylineBuilder::new("l1", "c1", 10)
    }

    fn add_text(b: &mut StorylineBuilder) {
        b.add_content(
            EntryType::Text,
            "content_1".into(),
            0,
            StyleSlot::Resolved("p".into()),
        );
    }

    #[test]
    fn first_eid_is_reserved_for_the_page_template() {
        let mut b = builder();
        assert_eq!(b.page_template_eid(), 10);
        add_text(&mut b);
        assert_eq!(b.all_eids(), vec![10, 11]);
        assert_eq!(b.next_free_eid(), 12);
    }

    #[test]
    fn pending_empty_line_margin_is_consumed_once() {
        let mut b = builder();
        b.set_pending_empty_line_margin_top(1.5);
        add_text(&mut b);
        add_text(&mut b);
        assert_eq!(b.entries[0].empty_line_margin_top, Some(1.5));
        assert_eq!(b.entries[1].empty_line_margin_top, None);
    }

    #[test]
    fn wrappers_enumerate_before_their_children() {
        let mut b = builder();
        b.start_block("div quote".into());
        add_text(&mut b);
        add_text(&mut b);
        b.end_block(&StyleContext::root()).unwrap();
        add_text(&mut b);
        assert_eq!(b.all_eids(), vec![10, 11, 12, 13, 14]);
        assert_eq!(b.entries.len(), 2);
        assert_eq!(b.entries[0].children.len(), 2);
    }

    #[test]
    fn mixed_content_images_consume_eids() {
        let mut b = builder();
        b.add_mixed_content(
            StyleSlot::Resolved("p".into()),
            vec![
                MixedPart::Text("before ".into()),
                MixedPart::Image {
                    resource: ResourceName::from("pic"),
                    style: "img-inline".into(),
                    alt: None,
                },
                MixedPart::Text(" after".into()),
            ],
            Vec::new(),
            None,
        );
        // Parent entry, then the image; raw text takes no EID.
        assert_eq!(b.all_eids(), vec![10, 11, 12]);
    }

    #[test]
    fn container_info_survives_exit() {
        let mut b = builder();
        let id = b.enter_container(ContainerKind::Poem, ContainerFlags::default());
        b.set_container_margins(Some(Dim::lh(1.0)), Some(Dim::lh(0.5)));
        b.exit_container().unwrap();
        let info = &b.containers[&id];
        assert_eq!(info.kind, ContainerKind::Poem);
        assert_eq!(info.margin_top, Some(Dim::lh(1.0)));
        assert_eq!(info.margin_bottom, Some(Dim::lh(0.5)));
    }

    #[test]
    fn unbalanced_stacks_are_invariant_violations() {
        let mut b = builder();
        assert!(matches!(
            b.exit_container(),
            Err(BuildError::Invariant(_))
        ));
        assert!(matches!(
            b.end_block(&StyleContext::root()),
            Err(BuildError::Invariant(_))
        ));
    }

    #[test]
    fn inline_images_emit_the_inline_render_mode() {
        let mut b = builder();
        b.add_inline_image(
            ResourceName::from("glyph"),
            StyleSlot::Resolved("img-inline".into()),
            Some("alt".into()),
        );
        let value = b.entries[0].to_value();
        let map = value.as_map().unwrap();
        assert_eq!(
            map.get(&bindery_types::sym::RENDER).and_then(Value::as_symbol),
            Some("inline")
        );
        assert_eq!(
            map.get(&bindery_types::sym::ALT_TEXT).and_then(Value::as_str),
            Some("alt")
        );
    }

    #[test]
    fn strip_marker_is_a_noop_at_storyline_start() {
        let mut b = builder();
        b.mark_previous_entry_strip_mb();
        add_text(&mut b);
        assert!(!b.entries[0].strip_margin_bottom);
        b.mark_previous_entry_strip_mb();
        assert!(b.entries[0].strip_margin_bottom);
    }
}
