pub mod error;
mod fetcher;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod ratelimit;
mod transport;

pub use crate::fetcher::{BLOCKED_MESSAGE, Fetched, RateLimitedFetcher, RetryPolicy};
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockTransport;
pub use crate::ratelimit::{REMAINING_HEADER, RESET_HEADER, RateLimitState};
pub use crate::transport::{HttpTransport, Response, Transport, TransportHandle};
pub use reqwest::StatusCode;
