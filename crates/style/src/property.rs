//! Property values and resolved property bags.

use crate::dimension::Dim;
use bindery_types::{sym, Color, Sym};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single style property value.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PropValue {
    Dim(Dim),
    Color(Color),
    Sym(Sym2),
    Str(String),
    Int(i64),
    Bool(bool),
}

// `Sym` itself is not serde-friendly (static names), so property bags carry
// symbols through this thin serializable wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sym2(pub Sym);

impl Serialize for Sym2 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Sym2 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        bindery_types::symbol::lookup(&name)
            .map(Sym2)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown symbol: {name}")))
    }
}

impl PropValue {
    pub fn symbol(s: Sym) -> Self {
        PropValue::Sym(Sym2(s))
    }

    pub fn as_dim(&self) -> Option<Dim> {
        match self {
            PropValue::Dim(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_zero_dim(&self) -> bool {
        matches!(self, PropValue::Dim(d) if d.is_zero())
    }
}

impl From<Dim> for PropValue {
    fn from(d: Dim) -> Self {
        PropValue::Dim(d)
    }
}

/// A resolved property bag: the canonical, order-independent form a style
/// deduplicates under. `BTreeMap` keyed by symbol id makes two bags with
/// identical contents compare and hash identically.
pub type StyleProps = BTreeMap<Sym, PropValue>;

/// A named base definition as produced by the CSS parser collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleDefinition {
    pub props: StyleProps,
    /// Single-parent inheritance link.
    pub extends: Option<String>,
}

impl StyleDefinition {
    pub fn new(props: StyleProps) -> Self {
        Self { props, extends: None }
    }

    pub fn extending(props: StyleProps, parent: impl Into<String>) -> Self {
        Self { props, extends: Some(parent.into()) }
    }
}

/// Properties that flow from parent to child scope per standard CSS
/// inheritance. Horizontal margins additionally flow in block contexts,
/// handled separately by the context.
pub fn is_css_inherited(key: Sym) -> bool {
    key == sym::FONT_FAMILY
        || key == sym::FONT_SIZE
        || key == sym::FONT_STYLE
        || key == sym::FONT_WEIGHT
        || key == sym::LINE_HEIGHT
        || key == sym::COLOR
        || key == sym::TEXT_ALIGN
        || key == sym::TEXT_INDENT
        || key == sym::LETTER_SPACING
        || key == sym::WHITE_SPACE
}

/// Properties an inline delta style may carry. Box geometry stays on the
/// enclosing block.
pub fn is_inline_property(key: Sym) -> bool {
    key == sym::FONT_FAMILY
        || key == sym::FONT_SIZE
        || key == sym::FONT_STYLE
        || key == sym::FONT_WEIGHT
        || key == sym::LINE_HEIGHT
        || key == sym::COLOR
        || key == sym::BACKGROUND_COLOR
        || key == sym::TEXT_DECORATION
        || key == sym::BASELINE_SHIFT
        || key == sym::LETTER_SPACING
        || key == sym::WHITE_SPACE
}

/// The dropcap-geometry subset excluded from first-glyph delta styles.
pub fn is_dropcap_geometry(key: Sym) -> bool {
    key == sym::FONT_SIZE
        || key == sym::LINE_HEIGHT
        || key == sym::FLOAT
        || key == sym::PADDING_TOP
        || key == sym::PADDING_BOTTOM
        || key == sym::PADDING_LEFT
        || key == sym::PADDING_RIGHT
}
