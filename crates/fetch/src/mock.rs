//! Scripted transport for testing.

use crate::error::{ErrorKind, Result};
use crate::transport::{Response, Transport};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(Response),
    Fail,
}

/// [`Transport`] answering from per-URL scripts.
///
/// Responses for a URL are handed out in order; the last one is repeated
/// forever. Unscripted URLs answer `404 Not Found`. Every call is recorded
/// with the (possibly paused) tokio clock so tests can assert on spacing.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`.
    pub fn respond(self, url: impl Into<String>, response: Response) -> Self {
        self.push(url.into(), Scripted::Respond(response));
        self
    }

    /// Queue a transport-level failure for `url`.
    pub fn fail(self, url: impl Into<String>) -> Self {
        self.push(url.into(), Scripted::Fail);
        self
    }

    fn push(&self, url: String, scripted: Scripted) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        scripts.entry(url).or_default().push_back(scripted);
    }

    /// Every URL requested so far, with the instant it was requested.
    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Instants at which `url` was requested.
    pub fn calls_to(&self, url: &str) -> Vec<Instant> {
        self.calls().into_iter().filter(|(called, _)| called == url).map(|(_, at)| at).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<Response> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push((url.to_string(), Instant::now()));
        let scripted = {
            let mut scripts = self.scripts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match scripts.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail) => exn::bail!(ErrorKind::Request(url.to_string())),
            None => Ok(Response::new(StatusCode::NOT_FOUND)),
        }
    }
}
