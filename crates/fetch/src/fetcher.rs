//! Rate-limit aware fetcher.
//!
//! Two kinds of throttling are handled:
//! - **primary**: the advertised hourly quota. When a response reports no
//!   calls remaining, the caller is suspended until the reset time (plus a
//!   grace period) before the response is handed back.
//! - **secondary**: undocumented abuse limits, signalled by `403`/`429`.
//!   The same URL is retried after a fixed delay, a bounded number of times.
//!
//! Every call may therefore block for a long time.

use crate::error::{ErrorKind, Result};
use crate::ratelimit::RateLimitState;
use crate::transport::{Response, TransportHandle};
use exn::ResultExt;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use time::UtcDateTime;

/// Message GitHub sends when a repository was taken down by staff.
pub const BLOCKED_MESSAGE: &str = "Repository access blocked";

/// How throttled requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay after a secondary throttle.
    pub secondary_delay: Duration,
    /// Total calls made for one URL before giving up on a secondary throttle.
    pub max_attempts: u32,
    /// Added to the advertised reset time.
    pub reset_grace: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { secondary_delay: Duration::from_secs(120), max_attempts: 10, reset_grace: Duration::from_secs(10) }
    }
}

/// Outcome of a successful fetch.
#[derive(Debug, Clone)]
pub enum Fetched {
    /// Whatever the server answered, including `404`.
    Response(Response),
    /// The resource was removed for legal or policy reasons; do not retry.
    Removed,
}

enum Verdict {
    Deliver,
    Removed,
    Throttled,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct RateLimitedFetcher {
    transport: TransportHandle,
    state: RateLimitState,
    policy: RetryPolicy,
}

impl RateLimitedFetcher {
    /// Make a baseline call to learn the current quota.
    ///
    /// Failure here means the API is unreachable or the credential is
    /// rejected, which no amount of retrying later will fix.
    pub async fn connect(transport: TransportHandle, baseline_url: &str, policy: RetryPolicy) -> Result<Self> {
        let response = transport.get(baseline_url).await.or_raise(|| ErrorKind::Connect(baseline_url.to_string()))?;
        if matches!(response.status, StatusCode::UNAUTHORIZED) || response.status.is_server_error() {
            tracing::error!(url = baseline_url, status = response.status.as_u16(), "Baseline request rejected");
            exn::bail!(ErrorKind::Connect(baseline_url.to_string()));
        }
        let mut fetcher = Self { transport, state: RateLimitState::default(), policy };
        fetcher.state.refresh(&response.headers);
        tracing::info!(
            remaining = ?fetcher.state.remaining,
            reset = ?fetcher.state.reset,
            "Connected to API"
        );
        if fetcher.state.is_exhausted() {
            fetcher.wait_for_reset().await;
        }
        Ok(fetcher)
    }

    pub fn state(&self) -> &RateLimitState {
        &self.state
    }

    /// Fetch `url`, waiting out primary limits and retrying secondary ones.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Request`] when the transport fails, and
    /// [`ErrorKind::Throttled`] when every attempt was throttled.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch(&mut self, url: &str) -> Result<Fetched> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            let response = self.transport.get(url).await?;
            self.state.refresh(&response.headers);
            let waited = if self.state.is_exhausted() {
                self.wait_for_reset().await;
                true
            } else {
                false
            };

            match Self::judge(&response) {
                Verdict::Deliver => return Ok(Fetched::Response(response)),
                Verdict::Removed => {
                    tracing::warn!(url, status = response.status.as_u16(), "Resource removed, skipping");
                    return Ok(Fetched::Removed);
                },
                Verdict::Throttled if attempt == attempts => {},
                // Forbidden because the quota ran out; the reset wait above
                // already covered it.
                Verdict::Throttled if waited => {
                    tracing::debug!(url, attempt, "Retrying after quota reset");
                },
                Verdict::Throttled => {
                    tracing::warn!(
                        url,
                        attempt,
                        delay_ms = self.policy.secondary_delay.as_millis() as u64,
                        "Secondary rate limit breached, waiting"
                    );
                    tokio::time::sleep(self.policy.secondary_delay).await;
                },
            }
        }
        tracing::warn!(url, attempts, "Giving up after repeated throttling");
        exn::bail!(ErrorKind::Throttled { url: url.to_string(), attempts })
    }

    fn judge(response: &Response) -> Verdict {
        match response.status {
            StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => Verdict::Removed,
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                let message = serde_json::from_slice::<ErrorBody>(&response.body).ok().and_then(|body| body.message);
                if message.as_deref() == Some(BLOCKED_MESSAGE) { Verdict::Removed } else { Verdict::Throttled }
            },
            _ => Verdict::Deliver,
        }
    }

    async fn wait_for_reset(&self) {
        let Some(until) = self.state.wait_until(self.policy.reset_grace) else {
            // No reset time advertised; the secondary delay is the best guess.
            tracing::error!(delay_ms = self.policy.secondary_delay.as_millis() as u64, "Primary rate limit breached");
            tokio::time::sleep(self.policy.secondary_delay).await;
            return;
        };
        let wait = Duration::try_from(until - UtcDateTime::now()).unwrap_or(Duration::ZERO);
        tracing::error!(until = until.unix_timestamp(), wait_secs = wait.as_secs(), "Primary rate limit breached, waiting");
        tokio::time::sleep(wait).await;
    }
}
