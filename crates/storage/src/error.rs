//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Queue entry does not exist (most likely consumed by someone else).
    #[display("entry not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Access denied to the staging directory or one of its entries.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Entry name contains separators, traversal or otherwise can't be a
    /// single file inside the queue directory.
    #[display("invalid entry name: {_0}")]
    InvalidName(#[error(not(source))] String),
    /// The configured queue root is unusable (relative, or not a directory).
    #[display("invalid queue root: {_0}")]
    InvalidRoot(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
