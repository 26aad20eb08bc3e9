//! The output value tree.
//!
//! Fragments carry their payload as a [`Value`] tree. Symbols are referenced
//! either by name (resolved by the serializer through the symbol table) or,
//! rarely, by raw id. Maps are keyed by schema symbols and iterate in
//! canonical id order, which keeps emitted fragments byte-stable.

use crate::symbol::Sym;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A symbol referenced by name; the serializer resolves it to an id.
    Symbol(String),
    /// A symbol referenced by raw id.
    SymbolId(u16),
    Str(String),
    Int(i64),
    /// A dimensioned number; the unit is a unit symbol (`em`, `lh`, ...).
    Dimension { value: f64, unit: Sym },
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<Sym, Value>),
}

impl Value {
    /// Symbol-by-name from a static schema symbol.
    pub fn sym(s: Sym) -> Self {
        Value::Symbol(s.name().to_string())
    }

    /// Symbol-by-name from a dynamic name (style names, story names, ...).
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn dim(value: f64, unit: Sym) -> Self {
        Value::Dimension { value, unit }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Sym, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// A convenience builder for `Value::Map`.
#[derive(Debug, Default)]
pub struct ValueMap {
    entries: BTreeMap<Sym, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: Sym, value: Value) -> Self {
        self.entries.insert(key, value);
        self
    }

    /// Inserts only when `value` is `Some`.
    pub fn set_opt(mut self, key: Sym, value: Option<Value>) -> Self {
        if let Some(v) = value {
            self.entries.insert(key, v);
        }
        self
    }

    pub fn build(self) -> Value {
        Value::Map(self.entries)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Symbol(name) => serializer.serialize_str(&format!("${name}")),
            Value::SymbolId(id) => serializer.serialize_str(&format!("$#{id}")),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Dimension { value, unit } => {
                serializer.serialize_str(&format!("{value}{}", unit.name()))
            }
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k.name(), v)?;
                }
                map.end()
            }
        }
    }
}
