//! Fetch Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The HTTP client could not be constructed.
    #[display("could not build HTTP client")]
    Client,
    /// The baseline request made on startup failed; nothing else will work.
    #[display("could not reach {_0}")]
    Connect(#[error(not(source))] String),
    /// A single request failed at the transport level (DNS, TLS, reset...).
    #[display("request to {_0} failed")]
    Request(#[error(not(source))] String),
    /// Still throttled after exhausting every attempt.
    #[display("still throttled after {attempts} attempts: {url}")]
    Throttled {
        #[error(not(source))]
        url: String,
        #[error(not(source))]
        attempts: u32,
    },
    /// A response body did not have the expected shape.
    #[display("unexpected response body from {_0}")]
    Decode(#[error(not(source))] String),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Throttled { .. })
    }
}
