//! Pipeline Error Types
//!
//! Stage loops never return these; they are raised per item (one archive
//! hour, one batch, one repository), logged, and contained there.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("staging queue unavailable")]
    Queue,
    #[display("archive cycle failed")]
    Archive,
    #[display("no cursor stored and no start given")]
    NoCursor,
    #[display("request failed")]
    Fetch,
    #[display("document store unavailable")]
    Store,
    #[display("could not extract page metrics")]
    Extract,
    #[display("{_0} not found")]
    NotFound(#[error(not(source))] String),
    #[display("{_0} was removed")]
    Removed(#[error(not(source))] String),
    #[display("{url} answered HTTP {status}")]
    Rejected {
        #[error(not(source))]
        url: String,
        #[error(not(source))]
        status: u16,
    },
    #[display("unexpected response from {_0}")]
    InvalidResponse(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Queue | Self::Archive | Self::Fetch | Self::Store | Self::Rejected { .. })
    }
}
