//! The intermediate representation for everything that lands inside a
//! storyline: text entries, images, wrapper blocks, tables, lists.

use crate::events::StyleEvent;
use bindery_style::{Dim, StyleContext};
use bindery_types::{sym, ResourceName, Sym, Value, ValueMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Text,
    Image,
    Container,
    Table,
    TableRow,
    TableBody,
    List,
    ListItem,
}

impl EntryType {
    pub fn symbol(self) -> Sym {
        match self {
            EntryType::Text => sym::TEXT,
            EntryType::Image => sym::IMAGE,
            EntryType::Container => sym::CONTAINER,
            EntryType::Table => sym::TABLE,
            EntryType::TableRow => sym::TABLE_ROW,
            EntryType::TableBody => sym::TABLE_BODY,
            EntryType::List => sym::LIST,
            EntryType::ListItem => sym::LIST_ITEM,
        }
    }
}

/// An entry's style: either resolved to a canonical name during the walk,
/// or a deferred spec the post-processor resolves once the entry's position
/// among its siblings is known.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleSlot {
    Deferred(String),
    Resolved(String),
}

impl StyleSlot {
    pub fn resolved_name(&self) -> Option<&str> {
        match self {
            StyleSlot::Resolved(name) => Some(name),
            StyleSlot::Deferred(_) => None,
        }
    }

    pub fn none() -> Self {
        StyleSlot::Resolved(String::new())
    }
}

/// One member of a mixed content list. Raw text strings do not consume
/// EIDs; inline images do.
#[derive(Debug, Clone, PartialEq)]
pub enum MixedItem {
    Text(String),
    Image {
        eid: u32,
        resource: ResourceName,
        style: String,
        alt: Option<String>,
    },
}

/// What an entry's content field holds.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryContent {
    /// Structural entries (wrappers, table scaffolding) carry no content of
    /// their own.
    None,
    /// Back-reference into the content accumulator.
    Blob { name: String, offset: usize },
    /// A standalone image resource.
    Resource(ResourceName),
    /// Interleaved text runs and inline images.
    Mixed(Vec<MixedItem>),
}

/// Extra keys carried by table cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellExtras {
    pub align: Option<Sym>,
    pub colspan: u32,
    pub rowspan: u32,
}

#[derive(Debug, Clone)]
pub struct ContentEntry {
    pub eid: u32,
    pub entry_type: EntryType,
    pub content: EntryContent,
    pub style: StyleSlot,
    pub style_events: Vec<StyleEvent>,
    pub children: Vec<ContentEntry>,
    pub heading_level: Option<u8>,
    /// Set when an empty line follows: margin-bottom is forced to zero
    /// before collapsing.
    pub strip_margin_bottom: bool,
    /// Empty-line carry-over, in lh; wins over collapsing.
    pub empty_line_margin_top: Option<f64>,
    pub empty_line_margin_bottom: Option<f64>,
    /// Adds the footer position and footnote classification at emission.
    pub footnote_marker: bool,
    /// Inline-rendered standalone image (images inside heading lines).
    pub render_inline: bool,
    pub alt_text: Option<String>,
    pub cell: Option<CellExtras>,
    /// Style context captured at `end_block`, for deferred child resolution.
    pub wrapper_ctx: Option<StyleContext>,
    /// Margin-collapsing topology: owning container and insertion order.
    pub container_id: u32,
    pub order: u32,
    /// Working vertical margins during post-processing, captured from the
    /// registered style and written back on re-registration.
    pub margin_top: Option<Dim>,
    pub margin_bottom: Option<Dim>,
}

impl ContentEntry {
    pub fn new(eid: u32, entry_type: EntryType, content: EntryContent, style: StyleSlot) -> Self {
        Self {
            eid,
            entry_type,
            content,
            style,
            style_events: Vec::new(),
            children: Vec::new(),
            heading_level: None,
            strip_margin_bottom: false,
            empty_line_margin_top: None,
            empty_line_margin_bottom: None,
            footnote_marker: false,
            render_inline: false,
            alt_text: None,
            cell: None,
            wrapper_ctx: None,
            container_id: 0,
            order: 0,
            margin_top: None,
            margin_bottom: None,
        }
    }

    /// DFS over this entry's EIDs: the entry itself, its mixed inline
    /// images, then children. Matches the reader's position-map order.
    pub fn collect_eids(&self, out: &mut Vec<u32>) {
        out.push(self.eid);
        if let EntryContent::Mixed(items) = &self.content {
            for item in items {
                if let MixedItem::Image { eid, .. } = item {
                    out.push(*eid);
                }
            }
        }
        for child in &self.children {
            child.collect_eids(out);
        }
    }

    /// The emitted form of this entry inside a storyline content list.
    pub fn to_value(&self) -> Value {
        let mut map = ValueMap::new()
            .set(sym::ID, Value::Int(self.eid as i64))
            .set(sym::TYPE, Value::sym(self.entry_type.symbol()));

        if let Some(name) = self.style.resolved_name() {
            if !name.is_empty() {
                map = map.set(sym::STYLE, Value::symbol(name));
            }
        }

        match &self.content {
            EntryContent::None => {}
            EntryContent::Blob { name, offset } => {
                map = map.set(
                    sym::CONTENT,
                    ValueMap::new()
                        .set(sym::NAME, Value::symbol(name))
                        .set(sym::OFFSET, Value::Int(*offset as i64))
                        .build(),
                );
            }
            EntryContent::Resource(resource) => {
                map = map.set(sym::RESOURCE_NAME, Value::symbol(resource.as_str()));
            }
            EntryContent::Mixed(items) => {
                let list = items
                    .iter()
                    .map(|item| match item {
                        MixedItem::Text(text) => Value::str(text.clone()),
                        MixedItem::Image {
                            eid,
                            resource,
                            style,
                            alt,
                        } => {
                            let mut image = ValueMap::new()
                                .set(sym::ID, Value::Int(*eid as i64))
                                .set(sym::TYPE, Value::sym(sym::IMAGE))
                                .set(sym::RESOURCE_NAME, Value::symbol(resource.as_str()))
                                .set(sym::RENDER, Value::sym(sym::INLINE));
                            if !style.is_empty() {
                                image = image.set(sym::STYLE, Value::symbol(style));
                            }
                            if let Some(alt) = alt {
                                image = image.set(sym::ALT_TEXT, Value::str(alt.clone()));
                            }
                            image.build()
                        }
                    })
                    .collect();
                map = map.set(sym::CONTENT_LIST, Value::List(list));
            }
        }

        if !self.children.is_empty() {
            map = map.set(
                sym::CONTENT_LIST,
                Value::List(self.children.iter().map(Self::to_value).collect()),
            );
        }
        if !self.style_events.is_empty() {
            map = map.set(
                sym::STYLE_EVENTS,
                Value::List(self.style_events.iter().map(event_to_value).collect()),
            );
        }
        if let Some(level) = self.heading_level {
            map = map.set(sym::HEADING_LEVEL, Value::Int(level as i64));
        }
        if self.render_inline {
            map = map.set(sym::RENDER, Value::sym(sym::INLINE));
        }
        if self.footnote_marker {
            map = map
                .set(sym::POSITION, Value::sym(sym::FOOTER))
                .set(sym::CLASSIFICATION, Value::sym(sym::FOOTNOTE));
        }
        if let Some(alt) = &self.alt_text {
            map = map.set(sym::ALT_TEXT, Value::str(alt.clone()));
        }
        if let Some(cell) = &self.cell {
            if let Some(align) = cell.align {
                map = map.set(sym::TEXT_ALIGN, Value::sym(align));
            }
            if cell.colspan > 1 {
                map = map.set(sym::COLSPAN, Value::Int(cell.colspan as i64));
            }
            if cell.rowspan > 1 {
                map = map.set(sym::ROWSPAN, Value::Int(cell.rowspan as i64));
            }
        }
        map.build()
    }
}

fn event_to_value(event: &StyleEvent) -> Value {
    let mut map = ValueMap::new()
        .set(sym::OFFSET, Value::Int(event.offset as i64))
        .set(sym::LENGTH, Value::Int(event.length as i64));
    if !event.style.is_empty() {
        map = map.set(sym::STYLE, Value::symbol(&event.style));
    }
    if let Some(link) = &event.link_to {
        map = map.set(sym::LINK_TO, Value::symbol(link.as_str()));
    }
    if event.footnote {
        map = map.set(sym::DISPLAY, Value::sym(sym::FOOTNOTE));
    }
    map.build()
}
