//! Archive Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The archive for this hour does not exist (yet).
    #[display("archive {name} unavailable (HTTP {status})")]
    Unavailable {
        #[error(not(source))]
        name: String,
        #[error(not(source))]
        status: u16,
    },
    #[display("could not download archive {_0}")]
    Download(#[error(not(source))] String),
    #[display("could not decompress archive")]
    Decompress,
    #[display("I/O error")]
    Io,
    #[display("could not write batch to queue")]
    Queue,
    #[display("invalid time cursor: {_0}")]
    InvalidCursor(#[error(not(source))] String),
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Download(_) | Self::Io | Self::Queue)
    }
}
