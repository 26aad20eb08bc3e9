//! Dimension primitives for style property values.

use bindery_types::{sym, Sym};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Units a dimension value may carry.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Em,
    Ex,
    Ratio,
    Percent,
    Px,
    Pt,
    Cm,
    Mm,
    In,
    Lh,
    Rem,
}

impl Unit {
    /// The schema symbol this unit is emitted as.
    pub fn symbol(self) -> Sym {
        match self {
            Unit::Em => sym::EM,
            Unit::Ex => sym::EX,
            Unit::Ratio => sym::RATIO,
            Unit::Percent => sym::PERCENT,
            Unit::Px => sym::PX,
            Unit::Pt => sym::PT,
            Unit::Cm => sym::CM,
            Unit::Mm => sym::MM,
            Unit::In => sym::IN,
            Unit::Lh => sym::LH,
            Unit::Rem => sym::REM,
        }
    }

    /// Physical units convert through points; everything else is relative.
    fn pt_factor(self) -> Option<f64> {
        match self {
            Unit::Pt => Some(1.0),
            Unit::Px => Some(1.0), // Treat px as pt
            Unit::In => Some(72.0),
            Unit::Cm => Some(28.35),
            Unit::Mm => Some(2.835),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol().name())
    }
}

/// A dimensioned number, e.g. `1.5lh` or `0.4em`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Dim {
    pub value: f64,
    pub unit: Unit,
}

impl Dim {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn lh(value: f64) -> Self {
        Self::new(value, Unit::Lh)
    }

    pub fn em(value: f64) -> Self {
        Self::new(value, Unit::Em)
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }

    fn to_pt(self) -> Option<f64> {
        self.unit.pt_factor().map(|f| self.value * f)
    }

    /// Sums two dimensions when they are dimensionally compatible: equal
    /// units always are, and the physical units convert through points.
    /// Returns `None` for incompatible pairs; callers override instead.
    pub fn try_add(self, other: Dim) -> Option<Dim> {
        if self.unit == other.unit {
            return Some(Dim::new(self.value + other.value, self.unit));
        }
        match (self.to_pt(), other.to_pt()) {
            (Some(a), Some(b)) => Some(Dim::new(a + b, Unit::Pt)),
            _ => None,
        }
    }

    /// The larger of two compatible dimensions; `None` when incomparable.
    pub fn try_max(self, other: Dim) -> Option<Dim> {
        if self.unit == other.unit {
            return Some(if other.value > self.value { other } else { self });
        }
        match (self.to_pt(), other.to_pt()) {
            (Some(a), Some(b)) => Some(if b > a { other } else { self }),
            _ => None,
        }
    }
}

impl Hash for Dim {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.to_bits().hash(state);
        self.unit.hash(state);
    }
}

impl Eq for Dim {}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}
