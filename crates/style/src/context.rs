//! Per-position style resolution context.
//!
//! A `StyleContext` is an immutable snapshot of the ancestor scope chain:
//! which tags and classes enclose the current element, which properties
//! flow down by inheritance, and how horizontal margins have accumulated
//! across block containers. Descending into an element produces a new
//! context; the caller discards it on ascent.
//!
//! The one deliberately shared piece is the empty-line state: a handle with
//! a single writer per storyline whose writes every context clone observes.

use crate::dimension::Dim;
use crate::property::{
    is_css_inherited, is_dropcap_geometry, is_inline_property, PropValue, StyleProps,
};
use crate::registry::{round_decimals, StyleRegistry, UsageKind, DIM_PRECISION};
use bindery_types::{sym, Sym};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Decimal places kept when rescaling inline line-heights. A compatibility
/// parameter of the reference renderer.
pub const LINE_HEIGHT_PRECISION: i32 = DIM_PRECISION;

/// Empty-line carry-over observed across container boundaries.
#[derive(Debug, Default)]
pub struct EmptyLineState {
    margin: Option<Dim>,
}

pub type EmptyLineHandle = Rc<RefCell<EmptyLineState>>;

pub fn new_empty_line_handle() -> EmptyLineHandle {
    Rc::new(RefCell::new(EmptyLineState::default()))
}

#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    pub tag: String,
    pub classes: Vec<String>,
}

/// Accumulated horizontal margin with the styles that contributed to it.
#[derive(Debug, Clone)]
pub struct MarginOrigin {
    pub value: Dim,
    pub contributors: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StyleContext {
    scopes: Vec<ScopeFrame>,
    inherited: StyleProps,
    margin_origins: HashMap<Sym, MarginOrigin>,
    empty_line: Option<EmptyLineHandle>,
}

impl StyleContext {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn with_empty_line(mut self, handle: EmptyLineHandle) -> Self {
        self.empty_line = Some(handle);
        self
    }

    pub fn scopes(&self) -> &[ScopeFrame] {
        &self.scopes
    }

    pub fn inherited(&self) -> &StyleProps {
        &self.inherited
    }

    // --- Descent ---

    /// Extends the scope chain; only CSS-inherited properties flow down.
    pub fn push(&self, registry: &mut StyleRegistry, tag: &str, classes: &[String]) -> Self {
        self.push_inner(registry, tag, classes, false)
    }

    /// Block descent: horizontal margins additionally flow down, merged
    /// under the cumulative contributor rule.
    pub fn push_block(&self, registry: &mut StyleRegistry, tag: &str, classes: &[String]) -> Self {
        self.push_inner(registry, tag, classes, true)
    }

    fn push_inner(
        &self,
        registry: &mut StyleRegistry,
        tag: &str,
        classes: &[String],
        block: bool,
    ) -> Self {
        let (props, origins) = self.cascade_with_origins(registry, tag, classes);
        let mut inherited: StyleProps = props
            .iter()
            .filter(|(k, _)| is_css_inherited(**k))
            .map(|(k, v)| (*k, v.clone()))
            .collect();

        let margin_origins = if block {
            for key in [sym::MARGIN_LEFT, sym::MARGIN_RIGHT] {
                if let Some(v) = props.get(&key) {
                    inherited.insert(key, v.clone());
                }
            }
            origins
        } else {
            self.margin_origins.clone()
        };

        let mut scopes = self.scopes.clone();
        scopes.push(ScopeFrame {
            tag: tag.to_string(),
            classes: classes.to_vec(),
        });

        Self {
            scopes,
            inherited,
            margin_origins,
            empty_line: self.empty_line.clone(),
        }
    }

    // --- Cascade ---

    /// Runs the full cascade for an element at this position and returns
    /// its resolved property bag without registering it.
    pub fn cascade(&self, registry: &mut StyleRegistry, tag: &str, classes: &[String]) -> StyleProps {
        self.cascade_with_origins(registry, tag, classes).0
    }

    fn cascade_with_origins(
        &self,
        registry: &mut StyleRegistry,
        tag: &str,
        classes: &[String],
    ) -> (StyleProps, HashMap<Sym, MarginOrigin>) {
        let mut props = self.inherited.clone();
        let mut origins = self.margin_origins.clone();

        // 2. Tag defaults, with zero-margin suppression: a default zero
        // horizontal margin never clobbers a non-zero inherited one.
        if !tag.is_empty() {
            if let Some(defaults) = registry.tag_default(tag).cloned() {
                for (key, value) in defaults {
                    if (key == sym::MARGIN_LEFT || key == sym::MARGIN_RIGHT)
                        && value.is_zero_dim()
                        && props.get(&key).is_some_and(|v| !v.is_zero_dim())
                    {
                        continue;
                    }
                    props.insert(key, value);
                }
            } else if registry.get(tag).is_some() {
                // The stylesheet shadows this element's default.
                let bag = registry.resolve_base(tag);
                self.merge_class(&mut props, &mut origins, tag, bag);
            }
        }

        // 3. Own classes, source order. Class margins follow the cumulative
        // contributor rule against the inherited accumulation.
        for class in classes {
            let mut bag = registry.resolve_base(class);
            // 5. Descendant-replacement: a flagged base class is replaced
            // outright by a matching `ancestor--class` rule.
            if registry.replaces_base(class) {
                if let Some(replacement) = self.descendant_replacement(registry, class) {
                    bag = replacement;
                }
            }
            self.merge_class(&mut props, &mut origins, class, bag);
        }

        // 4a. Descendant selectors from every scope ancestor.
        for frame_idx in 0..self.scopes.len() {
            let ancestors = self.scopes[frame_idx].classes.clone();
            for anc in &ancestors {
                self.apply_selector(registry, &mut props, &format!("{anc}--{tag}"));
                for class in classes {
                    if !registry.replaces_base(class) {
                        self.apply_selector(registry, &mut props, &format!("{anc}--{class}"));
                    }
                    self.apply_selector(registry, &mut props, &format!("{anc}--{tag}.{class}"));
                }
            }
        }

        // 4b. Direct-child selectors from the innermost scope only.
        if let Some(frame) = self.scopes.last() {
            for parent in frame.classes.clone() {
                self.apply_selector(registry, &mut props, &format!("{parent}>{tag}"));
                for class in classes {
                    self.apply_selector(registry, &mut props, &format!("{parent}>{class}"));
                }
            }
        }

        (props, origins)
    }

    fn apply_selector(&self, registry: &mut StyleRegistry, props: &mut StyleProps, name: &str) {
        if registry.get(name).is_some() {
            let bag = registry.resolve_base(name);
            props.extend(bag);
        }
    }

    fn descendant_replacement(
        &self,
        registry: &mut StyleRegistry,
        class: &str,
    ) -> Option<StyleProps> {
        // Innermost ancestor wins.
        for frame in self.scopes.iter().rev() {
            for anc in frame.classes.iter().rev() {
                let name = format!("{anc}--{class}");
                if registry.get(&name).is_some() {
                    return Some(registry.resolve_base(&name));
                }
            }
        }
        None
    }

    /// Merges one class bag into the working properties, applying the
    /// cumulative horizontal-margin rule: a style already in the
    /// contributor set overrides (same container, no double counting),
    /// a new contributor accumulates when dimensionally compatible.
    fn merge_class(
        &self,
        props: &mut StyleProps,
        origins: &mut HashMap<Sym, MarginOrigin>,
        class: &str,
        bag: StyleProps,
    ) {
        for (key, value) in bag {
            if key != sym::MARGIN_LEFT && key != sym::MARGIN_RIGHT {
                props.insert(key, value);
                continue;
            }
            let Some(dim) = value.as_dim() else {
                props.insert(key, value);
                continue;
            };
            match origins.get_mut(&key) {
                Some(origin) if origin.contributors.contains(class) => {
                    origin.value = dim;
                    props.insert(key, PropValue::Dim(dim));
                }
                Some(origin) => {
                    let merged = origin.value.try_add(dim).unwrap_or(dim);
                    origin.value = merged;
                    origin.contributors.insert(class.to_string());
                    props.insert(key, PropValue::Dim(merged));
                }
                None => {
                    origins.insert(
                        key,
                        MarginOrigin {
                            value: dim,
                            contributors: HashSet::from([class.to_string()]),
                        },
                    );
                    props.insert(key, PropValue::Dim(dim));
                }
            }
        }
    }

    // --- Resolution entry points ---

    /// Full cascade plus registration; marks the style used for text.
    pub fn resolve(&self, registry: &mut StyleRegistry, tag: &str, classes: &[String]) -> String {
        let props = self.cascade(registry, tag, classes);
        registry.register_resolved(props, &spec_hint(tag, classes), UsageKind::Text, true)
    }

    /// Registration without marking usage; later segmentation may discard
    /// the result.
    pub fn resolve_no_mark(
        &self,
        registry: &mut StyleRegistry,
        tag: &str,
        classes: &[String],
    ) -> String {
        let props = self.cascade(registry, tag, classes);
        registry.register_resolved(props, &spec_hint(tag, classes), UsageKind::Text, false)
    }

    /// A single cascaded property, without registering anything.
    pub fn resolve_property(
        &self,
        registry: &mut StyleRegistry,
        tag: &str,
        classes: &[String],
        key: Sym,
    ) -> Option<PropValue> {
        self.cascade(registry, tag, classes).remove(&key)
    }

    /// A plain inline style for body-text events: the cascaded properties
    /// restricted to inline-safe ones, without delta subtraction. Returns
    /// the empty string when nothing inline-relevant is set.
    pub fn resolve_inline(&self, registry: &mut StyleRegistry, classes: &[String]) -> String {
        let props = self.cascade(registry, "", classes);
        let inline: StyleProps = props
            .into_iter()
            .filter(|(k, _)| is_inline_property(*k))
            .collect();
        if inline.is_empty() {
            return String::new();
        }
        registry.register_resolved(inline, &classes.join("-"), UsageKind::Inline, true)
    }

    /// A delta-only inline style: properties that differ from the inherited
    /// block style, restricted to inline-safe properties. Returns the empty
    /// string when the delta is empty.
    pub fn resolve_inline_delta(&self, registry: &mut StyleRegistry, classes: &[String]) -> String {
        self.inline_delta(registry, classes, false)
    }

    /// The dropcap first-glyph variant: additionally excludes the dropcap
    /// geometry (font-size, line-height, float, padding).
    pub fn resolve_dropcap_glyph_delta(
        &self,
        registry: &mut StyleRegistry,
        classes: &[String],
    ) -> String {
        self.inline_delta(registry, classes, true)
    }

    fn inline_delta(
        &self,
        registry: &mut StyleRegistry,
        classes: &[String],
        dropcap_glyph: bool,
    ) -> String {
        let props = self.cascade(registry, "", classes);
        let mut delta = StyleProps::new();
        for (key, value) in &props {
            if !is_inline_property(*key) {
                continue;
            }
            if dropcap_glyph && is_dropcap_geometry(*key) {
                continue;
            }
            if self.inherited.get(key) == Some(value) {
                continue;
            }
            delta.insert(*key, value.clone());
        }

        // Line-height rides along only when the font size changes, rescaled
        // so the absolute line spacing is preserved.
        delta.remove(&sym::LINE_HEIGHT);
        if !dropcap_glyph {
            if let Some(inline_font) = delta.get(&sym::FONT_SIZE).and_then(PropValue::as_dim) {
                let parent_font = self
                    .inherited
                    .get(&sym::FONT_SIZE)
                    .and_then(PropValue::as_dim)
                    .unwrap_or(Dim::em(1.0));
                let parent_lh = self
                    .inherited
                    .get(&sym::LINE_HEIGHT)
                    .and_then(PropValue::as_dim)
                    .unwrap_or(Dim::lh(1.0));
                if parent_font.unit == inline_font.unit && inline_font.value != 0.0 {
                    let adjusted = round_decimals(
                        parent_lh.value * parent_font.value / inline_font.value,
                        LINE_HEIGHT_PRECISION,
                    );
                    delta.insert(
                        sym::LINE_HEIGHT,
                        PropValue::Dim(Dim::new(adjusted, parent_lh.unit)),
                    );
                } else if let Some(lh) = props.get(&sym::LINE_HEIGHT) {
                    delta.insert(sym::LINE_HEIGHT, lh.clone());
                }
            }
        }

        if delta.is_empty() {
            return String::new();
        }
        registry.register_resolved(delta, &classes.join("-"), UsageKind::Inline, true)
    }

    /// The deferred-resolution spec: space-joined element tag, scope
    /// classes, then the element's own classes.
    pub fn style_spec(&self, tag: &str, classes: &[String]) -> String {
        let mut parts: Vec<&str> = vec![tag];
        for frame in &self.scopes {
            parts.extend(frame.classes.iter().map(String::as_str));
        }
        parts.extend(classes.iter().map(String::as_str));
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }

    // --- Empty-line state ---

    pub fn set_empty_line_margin(&self, margin: Dim) {
        if let Some(handle) = &self.empty_line {
            handle.borrow_mut().margin = Some(margin);
        }
    }

    pub fn take_empty_line_margin(&self) -> Option<Dim> {
        self.empty_line.as_ref().and_then(|h| h.borrow_mut().margin.take())
    }
}

/// Canonical-name hint for an element: the spec tokens joined with `-`.
pub fn spec_hint(tag: &str, classes: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(1 + classes.len());
    if !tag.is_empty() {
        parts.push(tag);
    }
    parts.extend(classes.iter().map(String::as_str));
    if parts.is_empty() {
        "style".to_string()
    } else {
        parts.join("-")
    }
}
