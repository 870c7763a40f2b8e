//! Primary rate-limit bookkeeping.

use reqwest::header::HeaderMap;
use std::time::Duration;
use time::UtcDateTime;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Quota as last advertised by the remote API.
///
/// Both values are `None` until a response carrying them has been seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<i64>,
    /// Unix timestamp (seconds) at which the quota window resets.
    pub reset: Option<i64>,
}

impl RateLimitState {
    /// Update from response headers. A missing or unparsable header keeps the
    /// previously known value.
    pub fn refresh(&mut self, headers: &HeaderMap) {
        if let Some(remaining) = header_number(headers, REMAINING_HEADER) {
            self.remaining = Some(remaining);
        }
        if let Some(reset) = header_number(headers, RESET_HEADER) {
            self.reset = Some(reset);
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_some_and(|remaining| remaining <= 0)
    }

    /// Earliest moment another call may be made once exhausted.
    pub fn wait_until(&self, grace: Duration) -> Option<UtcDateTime> {
        let reset = UtcDateTime::from_unix_timestamp(self.reset?).ok()?;
        Some(reset + grace)
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
