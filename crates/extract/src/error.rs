//! Extraction Error Types

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Nothing in here is retryable: the input is either usable or it isn't.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A line or file is not the JSON it should be.
    #[display("malformed record")]
    MalformedRecord,
    /// A required field could not be found.
    #[display("missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// A field was found but could not be parsed.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError { field: &'static str, value: String },
    /// A repository set could not be serialized.
    #[display("could not serialize repository set")]
    Serialize,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
