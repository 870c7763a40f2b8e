//! Startup Error Types
//!
//! Anything raised here is fatal: the process logs it and exits.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("could not open staging queue {_0}")]
    Queue(#[error(not(source))] &'static str),
    #[display("could not open document store")]
    Store,
    #[display("could not reach the API")]
    Connect,
    #[display("could not resolve archive cursor")]
    Cursor,
    #[display("could not build HTTP client")]
    Client,
}
