pub mod context;
pub mod dimension;
pub mod parsers;
pub mod property;
pub mod registry;


pub use context::{
    new_empty_line_handle, spec_hint, EmptyLineHandle, MarginOrigin, ScopeFrame, StyleContext,
    LINE_HEIGHT_PRECISION,
};
pub use dimension::{Dim, Unit};
pub use parsers::{parse_declarations, parse_dim, StyleParseError};
pub use property::{
    is_css_inherited, is_inline_property, PropValue, StyleDefinition, StyleProps,
};
pub use registry::{round_decimals, StyleRegistry, UsageKind, DIM_PRECISION};
