//! Store Error Types

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// A stale revision is not an error; see [`Upsert::Conflict`](crate::Upsert::Conflict).
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored or supplied value could not be (de)serialized.
    #[display("invalid document data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    #[display("invalid revision: {_0}")]
    InvalidRevision(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
