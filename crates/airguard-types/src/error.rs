//! Error types for value parsing in airguard-types.

use thiserror::Error;

/// Errors that can occur when parsing airguard domain values from text.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The text is not one of the accepted spellings for the value.
    #[error("Invalid {kind}: '{value}' (expected one of: {expected})")]
    InvalidValue {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ParseError {
    pub(crate) fn invalid(kind: &'static str, value: &str, expected: &'static str) -> Self {
        ParseError::InvalidValue {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

/// Result type alias using airguard-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
