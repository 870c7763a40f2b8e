//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configuration source could not be read or did not match the schema.
    #[display("could not load configuration")]
    Load,
    /// A configuration file was named explicitly but does not exist.
    #[display("configuration file not found: {}", _0.display())]
    MissingFile(#[error(not(source))] PathBuf),
    /// Configuration loaded but a value is unusable.
    #[display("invalid configuration for {field}: {reason}")]
    Invalid {
        #[error(not(source))]
        field: &'static str,
        #[error(not(source))]
        reason: String,
    },
    /// No data directory configured and none could be derived for this platform.
    #[display("could not determine a data directory")]
    NoDataDirectory,
}

impl ErrorKind {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }

    /// Configuration errors never go away by themselves.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
