//! Schema symbols and the publication symbol table.
//!
//! Every key and enumerated value that can appear in an emitted fragment is
//! a named symbol with a stable numeric id. The engine always references
//! symbols by name or by `Sym` constant; resolving names to raw ids is the
//! serializer's job, through the [`SymbolTable`].

use std::collections::HashMap;
use std::fmt;

/// An interned schema symbol: a stable numeric id paired with its name.
///
/// Equality, ordering and hashing go through the id, so symbols are cheap
/// map keys and `BTreeMap<Sym, _>` iterates in canonical schema order.
#[derive(Debug, Clone, Copy)]
pub struct Sym {
    id: u16,
    name: &'static str,
}

impl Sym {
    pub const fn new(id: u16, name: &'static str) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Sym {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Sym {}

impl PartialOrd for Sym {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sym {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for Sym {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// All symbols known to the publication schema.
pub mod sym {
    use super::Sym;

    // Structural keys.
    pub const ID: Sym = Sym::new(10, "id");
    pub const TYPE: Sym = Sym::new(11, "type");
    pub const NAME: Sym = Sym::new(12, "name");
    pub const STYLE: Sym = Sym::new(13, "style");
    pub const CONTENT: Sym = Sym::new(14, "content");
    pub const CONTENT_LIST: Sym = Sym::new(15, "content_list");
    pub const OFFSET: Sym = Sym::new(16, "offset");
    pub const LENGTH: Sym = Sym::new(17, "length");
    pub const LINK_TO: Sym = Sym::new(18, "link_to");
    pub const RESOURCE_NAME: Sym = Sym::new(19, "resource_name");
    pub const ALT_TEXT: Sym = Sym::new(20, "alt_text");
    pub const HEADING_LEVEL: Sym = Sym::new(21, "heading_level");
    pub const STYLE_EVENTS: Sym = Sym::new(22, "style_events");
    pub const STORY_NAME: Sym = Sym::new(23, "story_name");
    pub const SECTION_NAME: Sym = Sym::new(24, "section_name");
    pub const PAGE_TEMPLATES: Sym = Sym::new(25, "page_templates");
    pub const ENTRIES: Sym = Sym::new(26, "entries");
    pub const RENDER: Sym = Sym::new(27, "render");
    pub const POSITION: Sym = Sym::new(28, "position");
    pub const CLASSIFICATION: Sym = Sym::new(29, "classification");
    pub const LAYOUT: Sym = Sym::new(30, "layout");
    pub const FLOAT: Sym = Sym::new(31, "float");
    pub const WIDTH: Sym = Sym::new(32, "width");
    pub const HEIGHT: Sym = Sym::new(33, "height");
    pub const COLSPAN: Sym = Sym::new(34, "colspan");
    pub const ROWSPAN: Sym = Sym::new(35, "rowspan");
    pub const DISPLAY: Sym = Sym::new(36, "display");

    // Fragment types.
    pub const STORYLINE: Sym = Sym::new(60, "storyline");
    pub const SECTION: Sym = Sym::new(61, "section");
    pub const CONTENT_FRAGMENT: Sym = Sym::new(62, "content_fragment");
    pub const RESOURCE_PATH: Sym = Sym::new(63, "resource_path");

    // Content entry types.
    pub const TEXT: Sym = Sym::new(70, "text");
    pub const IMAGE: Sym = Sym::new(71, "image");
    pub const CONTAINER: Sym = Sym::new(72, "container");
    pub const TABLE: Sym = Sym::new(73, "table");
    pub const TABLE_ROW: Sym = Sym::new(74, "table_row");
    pub const TABLE_BODY: Sym = Sym::new(75, "table_body");
    pub const LIST: Sym = Sym::new(76, "list");
    pub const LIST_ITEM: Sym = Sym::new(77, "list_item");

    // Style property keys.
    pub const FONT_FAMILY: Sym = Sym::new(100, "font_family");
    pub const FONT_SIZE: Sym = Sym::new(101, "font_size");
    pub const FONT_STYLE: Sym = Sym::new(102, "font_style");
    pub const FONT_WEIGHT: Sym = Sym::new(103, "font_weight");
    pub const LINE_HEIGHT: Sym = Sym::new(104, "line_height");
    pub const COLOR: Sym = Sym::new(105, "color");
    pub const BACKGROUND_COLOR: Sym = Sym::new(106, "background_color");
    pub const TEXT_ALIGN: Sym = Sym::new(107, "text_align");
    pub const TEXT_INDENT: Sym = Sym::new(108, "text_indent");
    pub const TEXT_DECORATION: Sym = Sym::new(109, "text_decoration");
    pub const MARGIN_TOP: Sym = Sym::new(110, "margin_top");
    pub const MARGIN_BOTTOM: Sym = Sym::new(111, "margin_bottom");
    pub const MARGIN_LEFT: Sym = Sym::new(112, "margin_left");
    pub const MARGIN_RIGHT: Sym = Sym::new(113, "margin_right");
    pub const PADDING_TOP: Sym = Sym::new(114, "padding_top");
    pub const PADDING_BOTTOM: Sym = Sym::new(115, "padding_bottom");
    pub const PADDING_LEFT: Sym = Sym::new(116, "padding_left");
    pub const PADDING_RIGHT: Sym = Sym::new(117, "padding_right");
    pub const BASELINE_SHIFT: Sym = Sym::new(118, "baseline_shift");
    pub const WHITE_SPACE: Sym = Sym::new(119, "white_space");
    pub const DROPCAP: Sym = Sym::new(120, "dropcap");
    pub const LETTER_SPACING: Sym = Sym::new(121, "letter_spacing");

    // Enumerated property values.
    pub const NORMAL: Sym = Sym::new(140, "normal");
    pub const ITALIC: Sym = Sym::new(141, "italic");
    pub const BOLD: Sym = Sym::new(142, "bold");
    pub const LINE_THROUGH: Sym = Sym::new(143, "line_through");
    pub const UNDERLINE: Sym = Sym::new(144, "underline");
    pub const LEFT: Sym = Sym::new(145, "left");
    pub const RIGHT: Sym = Sym::new(146, "right");
    pub const CENTER: Sym = Sym::new(147, "center");
    pub const JUSTIFY: Sym = Sym::new(148, "justify");
    pub const PRE: Sym = Sym::new(149, "pre");
    pub const FOOTER: Sym = Sym::new(150, "footer");
    pub const FOOTNOTE: Sym = Sym::new(151, "footnote");
    pub const INLINE: Sym = Sym::new(152, "inline");
    pub const SCALE_FIT: Sym = Sym::new(153, "scale_fit");

    // Dimension units.
    pub const EM: Sym = Sym::new(160, "em");
    pub const EX: Sym = Sym::new(161, "ex");
    pub const RATIO: Sym = Sym::new(162, "ratio");
    pub const PERCENT: Sym = Sym::new(163, "percent");
    pub const PX: Sym = Sym::new(164, "px");
    pub const PT: Sym = Sym::new(165, "pt");
    pub const CM: Sym = Sym::new(166, "cm");
    pub const MM: Sym = Sym::new(167, "mm");
    pub const IN: Sym = Sym::new(168, "in");
    pub const LH: Sym = Sym::new(169, "lh");
    pub const REM: Sym = Sym::new(170, "rem");

    pub(super) const ALL: &[Sym] = &[
        ID,
        TYPE,
        NAME,
        STYLE,
        CONTENT,
        CONTENT_LIST,
        OFFSET,
        LENGTH,
        LINK_TO,
        RESOURCE_NAME,
        ALT_TEXT,
        HEADING_LEVEL,
        STYLE_EVENTS,
        STORY_NAME,
        SECTION_NAME,
        PAGE_TEMPLATES,
        ENTRIES,
        RENDER,
        POSITION,
        CLASSIFICATION,
        LAYOUT,
        FLOAT,
        WIDTH,
        HEIGHT,
        COLSPAN,
        ROWSPAN,
        DISPLAY,
        STORYLINE,
        SECTION,
        CONTENT_FRAGMENT,
        RESOURCE_PATH,
        TEXT,
        IMAGE,
        CONTAINER,
        TABLE,
        TABLE_ROW,
        TABLE_BODY,
        LIST,
        LIST_ITEM,
        FONT_FAMILY,
        FONT_SIZE,
        FONT_STYLE,
        FONT_WEIGHT,
        LINE_HEIGHT,
        COLOR,
        BACKGROUND_COLOR,
        TEXT_ALIGN,
        TEXT_INDENT,
        TEXT_DECORATION,
        MARGIN_TOP,
        MARGIN_BOTTOM,
        MARGIN_LEFT,
        MARGIN_RIGHT,
        PADDING_TOP,
        PADDING_BOTTOM,
        PADDING_LEFT,
        PADDING_RIGHT,
        BASELINE_SHIFT,
        WHITE_SPACE,
        DROPCAP,
        LETTER_SPACING,
        NORMAL,
        ITALIC,
        BOLD,
        LINE_THROUGH,
        UNDERLINE,
        LEFT,
        RIGHT,
        CENTER,
        JUSTIFY,
        PRE,
        FOOTER,
        FOOTNOTE,
        INLINE,
        SCALE_FIT,
        EM,
        EX,
        RATIO,
        PERCENT,
        PX,
        PT,
        CM,
        MM,
        IN,
        LH,
        REM,
    ];
}

/// Bidirectional name/id lookup over the schema symbols.
///
/// Seeded with every declared symbol; the serializer resolves symbolic
/// names against this table when writing the binary form.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    by_name: HashMap<&'static str, Sym>,
    by_id: HashMap<u16, Sym>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut by_name = HashMap::with_capacity(sym::ALL.len());
        let mut by_id = HashMap::with_capacity(sym::ALL.len());
        for &s in sym::ALL {
            by_name.insert(s.name(), s);
            by_id.insert(s.id(), s);
        }
        Self { by_name, by_id }
    }

    pub fn by_name(&self, name: &str) -> Option<Sym> {
        self.by_name.get(name).copied()
    }

    pub fn by_id(&self, id: u16) -> Option<Sym> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide lookup by name against the seeded table.
pub fn lookup(name: &str) -> Option<Sym> {
    use std::sync::OnceLock;
    static TABLE: OnceLock<SymbolTable> = OnceLock::new();
    TABLE.get_or_init(SymbolTable::new).by_name(name)
}
