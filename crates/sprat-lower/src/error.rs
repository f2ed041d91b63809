//! Error types for sprat-lower

use thiserror::Error;

/// Malformed source.
///
/// `line` and `column` are 1-based and point at the start of the offending
/// span.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Failure while lowering a parsed module to executable code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Codegen error: {0}")]
    Codegen(String),
}
