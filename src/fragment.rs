//! Typed, named output fragments and the ordered fragment collection.

use crate::error::BuildError;
use bindery_types::{sym, Sym, Value, ValueMap};
use std::collections::HashMap;

/// A top-level unit of the output publication.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub fragment_type: Sym,
    pub name: String,
    pub value: Value,
}

impl Fragment {
    /// JSON rendering of the payload, for diffing and diagnostics; the
    /// binary form is the encoder collaborator's job.
    pub fn value_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.value)
    }
}

/// Ordered collection of fragments keyed by `(type, name)`.
#[derive(Debug, Default)]
pub struct FragmentList {
    items: Vec<Fragment>,
    index: HashMap<(Sym, String), usize>,
}

impl FragmentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: Fragment) -> Result<(), BuildError> {
        let key = (fragment.fragment_type, fragment.name.clone());
        if self.index.contains_key(&key) {
            return Err(BuildError::DuplicateFragment {
                kind: fragment.fragment_type.name().to_string(),
                name: fragment.name,
            });
        }
        self.index.insert(key, self.items.len());
        self.items.push(fragment);
        Ok(())
    }

    pub fn get(&self, fragment_type: Sym, name: &str) -> Option<&Fragment> {
        self.index
            .get(&(fragment_type, name.to_string()))
            .map(|&i| &self.items[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every EID across the publication, in fragment emission order:
    /// storyline entries in DFS order, each section's page-template ids as
    /// the section fragment is reached.
    pub fn all_eids(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for fragment in &self.items {
            if fragment.fragment_type == sym::SECTION {
                if let Some(templates) = fragment
                    .value
                    .as_map()
                    .and_then(|m| m.get(&sym::PAGE_TEMPLATES))
                    .and_then(Value::as_list)
                {
                    for template in templates {
                        if let Some(id) = template
                            .as_map()
                            .and_then(|m| m.get(&sym::ID))
                            .and_then(Value::as_int)
                        {
                            out.push(id as u32);
                        }
                    }
                }
            }
            if fragment.fragment_type == sym::STORYLINE {
                if let Some(list) = fragment
                    .value
                    .as_map()
                    .and_then(|m| m.get(&sym::CONTENT_LIST))
                    .and_then(Value::as_list)
                {
                    for entry in list {
                        collect_entry_eids(entry, &mut out);
                    }
                }
            }
        }
        out
    }
}

fn collect_entry_eids(value: &Value, out: &mut Vec<u32>) {
    let Some(map) = value.as_map() else {
        return; // raw text strings in mixed content carry no EID
    };
    if let Some(id) = map.get(&sym::ID).and_then(Value::as_int) {
        out.push(id as u32);
    }
    if let Some(children) = map.get(&sym::CONTENT_LIST).and_then(Value::as_list) {
        for child in children {
            collect_entry_eids(child, out);
        }
    }
}

/// The root resource-path fragment every publication carries.
pub fn resource_path_fragment() -> Fragment {
    Fragment {
        fragment_type: sym::RESOURCE_PATH,
        name: "resource_path".to_string(),
        value: ValueMap::new()
            .set(sym::ENTRIES, Value::List(Vec::new()))
            .build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut list = FragmentList::new();
        let fragment = Fragment {
            fragment_type: sym::STORYLINE,
            name: "l1".into(),
            value: Value::List(vec![]),
        };
        list.push(fragment.clone()).unwrap();
        assert!(matches!(
            list.push(fragment),
            Err(BuildError::DuplicateFragment { .. })
        ));
    }

    #[test]
    fn lookup_by_type_and_name() {
        let mut list = FragmentList::new();
        list.push(resource_path_fragment()).unwrap();
        assert!(list.get(sym::RESOURCE_PATH, "resource_path").is_some());
        assert!(list.get(sym::STORYLINE, "resource_path").is_none());
    }
}
