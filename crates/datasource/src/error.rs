//! Error types for the datasource crate.

use thiserror::Error;

/// Errors produced while parsing one raw line from an external dataset.
///
/// Parsing is pure: a `ParseError` always refers to the line it was given
/// and never to any I/O state. The caller decides whether one bad line
/// aborts the whole ingestion or is skipped (`continue_on_error`).
#[derive(Error, Debug)]
pub enum ParseError {
    /// The input line was empty (or whitespace only)
    #[error("empty input line")]
    EmptyLine,

    /// The line did not split into the expected number of fields
    #[error("expected {expected} fields but found {found}")]
    FieldCount { expected: usize, found: usize },

    /// A field that must be numeric could not be parsed
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Convenience type alias for parse results in this crate
pub type Result<T> = std::result::Result<T, ParseError>;
