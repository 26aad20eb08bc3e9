pub mod color;
pub mod ids;
pub mod symbol;
pub mod value;

pub use color::Color;
pub use ids::{AnchorId, ResourceName};
pub use symbol::{sym, Sym, SymbolTable};
pub use value::{Value, ValueMap};
