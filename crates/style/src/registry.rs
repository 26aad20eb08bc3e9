//! The style registry: base definitions, resolved-bag registration and the
//! per-kind usage tracking the serializer prunes dead styles with.

use crate::parsers::parse_declarations;
use crate::property::{PropValue, StyleDefinition, StyleProps};
use bindery_types::{sym, AnchorId};
use std::collections::{HashMap, HashSet};

/// How many decimal places derived dimension values keep. A compatibility
/// parameter of the publication format.
pub const DIM_PRECISION: i32 = 4;

pub fn round_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// The role a style is used in. The serializer drops styles whose usage set
/// stays empty after the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    Text,
    Image,
    Wrapper,
    Inline,
}

#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    /// Named base definitions, as fed by the stylesheet parser.
    base: HashMap<String, StyleDefinition>,
    /// Built-in element defaults; a base style of the same name shadows one.
    tag_defaults: HashMap<&'static str, StyleProps>,
    /// Canonicalized bag -> canonical style name.
    resolved: HashMap<StyleProps, String>,
    /// Canonical style name -> its bag.
    registered: HashMap<String, StyleProps>,
    usage: HashMap<String, HashSet<UsageKind>>,
    /// Next disambiguation suffix per name hint.
    name_seq: HashMap<String, u32>,
    external_links: HashMap<String, AnchorId>,
    external_link_seq: u32,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self {
            tag_defaults: builtin_tag_defaults(),
            ..Self::default()
        }
    }

    // --- Base definitions ---

    /// Idempotently creates an empty sentinel definition so later lookups
    /// succeed. Unknown class references degrade to this.
    pub fn ensure_base_style(&mut self, name: &str) {
        if !self.base.contains_key(name) {
            self.base.insert(name.to_string(), StyleDefinition::default());
        }
    }

    pub fn insert_base(&mut self, name: impl Into<String>, def: StyleDefinition) {
        self.base.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&StyleDefinition> {
        self.base.get(name)
    }

    pub fn tag_default(&self, tag: &str) -> Option<&StyleProps> {
        // A stylesheet-provided base style shadows the built-in default.
        if self.base.contains_key(tag) {
            return None;
        }
        self.tag_defaults.get(tag)
    }

    /// Certain inline styles are replaced outright by a matching descendant
    /// selector instead of merged under it.
    pub fn replaces_base(&self, class: &str) -> bool {
        matches!(class, "sub" | "sup" | "small")
    }

    /// Flattens a definition through its `extends` chain, parents first.
    pub fn resolve_base(&mut self, name: &str) -> StyleProps {
        self.ensure_base_style(name);
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            if !seen.insert(n.clone()) {
                break; // inheritance cycle; keep what we have
            }
            match self.base.get(&n) {
                Some(def) => {
                    chain.push(def.props.clone());
                    current = def.extends.clone();
                }
                None => break,
            }
        }
        let mut props = StyleProps::new();
        for bag in chain.into_iter().rev() {
            props.extend(bag);
        }
        props
    }

    /// Flattens an already-known definition (used by the inheritance
    /// resolver of the CSS collaborator).
    pub fn resolve_inheritance(&mut self, def: &StyleDefinition) -> StyleProps {
        let mut props = match &def.extends {
            Some(parent) => self.resolve_base(&parent.clone()),
            None => StyleProps::new(),
        };
        props.extend(def.props.clone());
        props
    }

    // --- Resolved registration ---

    /// Registers a resolved bag under a deterministic canonical name.
    /// Identical bags alias to the first name seen; a fresh bag whose hint
    /// is already taken gets a numbered variant.
    pub fn register_resolved(
        &mut self,
        props: StyleProps,
        hint: &str,
        usage: UsageKind,
        mark_used: bool,
    ) -> String {
        if let Some(name) = self.resolved.get(&props) {
            let name = name.clone();
            if mark_used {
                self.mark_usage(&name, usage);
            }
            return name;
        }

        let hint = if hint.is_empty() { "style" } else { hint };
        let name = if self.registered.contains_key(hint) {
            loop {
                let n = self.name_seq.entry(hint.to_string()).or_insert(2);
                let candidate = format!("{hint}-{n}");
                *n += 1;
                if !self.registered.contains_key(&candidate) {
                    break candidate;
                }
            }
        } else {
            hint.to_string()
        };

        self.resolved.insert(props.clone(), name.clone());
        self.registered.insert(name.clone(), props);
        if mark_used {
            self.mark_usage(&name, usage);
        }
        name
    }

    pub fn registered_props(&self, name: &str) -> Option<&StyleProps> {
        self.registered.get(name)
    }

    pub fn mark_usage(&mut self, name: &str, kind: UsageKind) {
        self.usage.entry(name.to_string()).or_default().insert(kind);
    }

    pub fn usage_of(&self, name: &str) -> impl Iterator<Item = UsageKind> + '_ {
        self.usage.get(name).into_iter().flatten().copied()
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.usage.get(name).is_some_and(|set| !set.is_empty())
    }

    // --- Derived image styles ---

    /// A block image style sized as a width ratio of the screen.
    pub fn resolve_image_style(&mut self, width: f64, screen_width: f64) -> String {
        let ratio = if screen_width > 0.0 {
            round_decimals((width / screen_width).min(1.0), DIM_PRECISION)
        } else {
            1.0
        };
        let mut props = StyleProps::new();
        props.insert(
            sym::WIDTH,
            PropValue::Dim(crate::dimension::Dim::new(ratio, crate::dimension::Unit::Ratio)),
        );
        self.register_resolved(props, "img-block", UsageKind::Image, true)
    }

    /// An inline image style sized in ems against the reference font size.
    pub fn resolve_inline_image_style(&mut self, width: f64, height: f64) -> String {
        const REFERENCE_FONT_PX: f64 = 16.0;
        let mut props = StyleProps::new();
        props.insert(
            sym::WIDTH,
            PropValue::Dim(crate::dimension::Dim::em(round_decimals(
                width / REFERENCE_FONT_PX,
                DIM_PRECISION,
            ))),
        );
        props.insert(
            sym::HEIGHT,
            PropValue::Dim(crate::dimension::Dim::em(round_decimals(
                height / REFERENCE_FONT_PX,
                DIM_PRECISION,
            ))),
        );
        self.register_resolved(props, "img-inline", UsageKind::Inline, true)
    }

    // --- External links ---

    /// Deduplicating registration of external URLs to opaque anchor ids.
    pub fn register_external_link(&mut self, url: &str) -> AnchorId {
        if let Some(anchor) = self.external_links.get(url) {
            return anchor.clone();
        }
        self.external_link_seq += 1;
        let anchor = AnchorId::new(format!("ext{}", self.external_link_seq));
        self.external_links.insert(url.to_string(), anchor.clone());
        anchor
    }
}

fn builtin_tag_defaults() -> HashMap<&'static str, StyleProps> {
    let table: &[(&'static str, &'static str)] = &[
        (
            "p",
            "margin-left: 0em; margin-right: 0em; text-indent: 1.2em; text-align: justify",
        ),
        ("h1", "font-size: 2em; font-weight: bold; text-align: center; margin-top: 1lh; margin-bottom: 1lh"),
        ("h2", "font-size: 1.5em; font-weight: bold; text-align: center; margin-top: 1lh; margin-bottom: 1lh"),
        ("h3", "font-size: 1.17em; font-weight: bold; text-align: center; margin-top: 1lh; margin-bottom: 1lh"),
        ("h4", "font-size: 1em; font-weight: bold; text-align: center; margin-top: 1lh; margin-bottom: 1lh"),
        ("h5", "font-size: 0.83em; font-weight: bold; text-align: center; margin-top: 1lh; margin-bottom: 1lh"),
        ("h6", "font-size: 0.67em; font-weight: bold; text-align: center; margin-top: 1lh; margin-bottom: 1lh"),
        ("div", ""),
        ("blockquote", "margin-left: 2em; margin-right: 2em"),
        ("ol", "margin-left: 1.5em"),
        ("td", "padding-left: 0.2em; padding-right: 0.2em"),
        ("th", "padding-left: 0.2em; padding-right: 0.2em; font-weight: bold; text-align: center"),
        ("img", ""),
    ];
    table
        .iter()
        .map(|(tag, decls)| {
            let props = parse_declarations(decls)
                .unwrap_or_else(|e| panic!("builtin default for '{tag}' is malformed: {e}"));
            (*tag, props)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::Dim;

    fn props_of(decls: &str) -> StyleProps {
        parse_declarations(decls).unwrap()
    }

    #[test]
    fn identical_bags_alias_to_one_name() {
        let mut reg = StyleRegistry::new();
        let a = reg.register_resolved(props_of("margin-top: 1lh"), "p", UsageKind::Text, true);
        let b = reg.register_resolved(props_of("margin-top: 1lh"), "other", UsageKind::Text, true);
        assert_eq!(a, b);
        assert_eq!(a, "p");
    }

    #[test]
    fn distinct_bags_with_same_hint_get_variants() {
        let mut reg = StyleRegistry::new();
        let a = reg.register_resolved(props_of("margin-top: 1lh"), "p", UsageKind::Text, true);
        let b = reg.register_resolved(props_of("margin-top: 2lh"), "p", UsageKind::Text, true);
        assert_eq!(a, "p");
        assert_eq!(b, "p-2");
    }

    #[test]
    fn inheritance_flattens_parent_chain() {
        let mut reg = StyleRegistry::new();
        reg.insert_base("base", StyleDefinition::new(props_of("font-size: 1em; color: #000000")));
        reg.insert_base(
            "child",
            StyleDefinition::extending(props_of("color: #ff0000"), "base"),
        );
        let props = reg.resolve_base("child");
        assert_eq!(props[&sym::FONT_SIZE], PropValue::Dim(Dim::em(1.0)));
        assert_eq!(
            props[&sym::COLOR],
            PropValue::Color(bindery_types::Color::new(0xff, 0, 0))
        );
    }

    #[test]
    fn inheritance_cycles_terminate() {
        let mut reg = StyleRegistry::new();
        reg.insert_base("a", StyleDefinition::extending(props_of("font-size: 1em"), "b"));
        reg.insert_base("b", StyleDefinition::extending(props_of("color: #fff"), "a"));
        let props = reg.resolve_base("a");
        assert!(props.contains_key(&sym::FONT_SIZE));
    }

    #[test]
    fn external_links_deduplicate() {
        let mut reg = StyleRegistry::new();
        let a = reg.register_external_link("https://example.com/a");
        let b = reg.register_external_link("https://example.com/b");
        let a2 = reg.register_external_link("https://example.com/a");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "ext1");
    }

    #[test]
    fn stylesheet_base_shadows_tag_default() {
        let mut reg = StyleRegistry::new();
        assert!(reg.tag_default("p").is_some());
        reg.insert_base("p", StyleDefinition::new(props_of("text-align: left")));
        assert!(reg.tag_default("p").is_none());
    }

    #[test]
    fn usage_kinds_track_independently() {
        let mut reg = StyleRegistry::new();
        let name = reg.register_resolved(props_of("margin-top: 1lh"), "q", UsageKind::Text, true);
        reg.mark_usage(&name, UsageKind::Wrapper);
        let kinds: HashSet<_> = reg.usage_of(&name).collect();
        assert!(kinds.contains(&UsageKind::Text));
        assert!(kinds.contains(&UsageKind::Wrapper));
        assert!(!kinds.contains(&UsageKind::Inline));
    }
}
