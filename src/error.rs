use bindery_style::StyleParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invariant violation: {0}")]
    Invariant(String),
    #[error("Duplicate fragment: {kind} '{name}'")]
    DuplicateFragment { kind: String, name: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Style error: {0}")]
    Style(#[from] StyleParseError),
}
