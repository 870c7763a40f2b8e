//! Stored document shapes.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::{OptionExt, ResultExt};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::UtcDateTime;

// Hex characters of the BLAKE3 digest kept in a revision.
const DIGEST_LENGTH: usize = 16;

/// The enriched record for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDocument {
    /// Repository metadata from the API, minus every `*url*` field.
    pub api_response: serde_json::Value,
    /// Default branch tree listing; absent when it was too large.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<serde_json::Value>,
    pub scraped_information: ScrapedInformation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedInformation {
    pub contributors: u64,
    pub commits: u64,
    /// Unix epoch, milliseconds.
    pub scrape_time: i64,
}

impl ScrapedInformation {
    pub fn new(contributors: u64, commits: u64, scraped_at: UtcDateTime) -> Self {
        let scrape_time = i64::try_from(scraped_at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX);
        Self { contributors, commits, scrape_time }
    }
}

impl RepoDocument {
    pub(crate) fn encode(&self) -> Result<String> {
        serde_json::to_string(self).or_raise(|| ErrorKind::InvalidData("document"))
    }

    pub(crate) fn decode(body: &str) -> Result<Self> {
        serde_json::from_str(body).or_raise(|| ErrorKind::InvalidData("document"))
    }
}

/// Optimistic concurrency token, `"<generation>-<digest>"`.
///
/// The generation counts writes to the document; the digest is a truncated
/// BLAKE3 hash of the stored body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{generation}-{digest}")]
pub struct Revision {
    generation: u64,
    digest: String,
}

impl Revision {
    /// Revision of the first write of `body`.
    pub fn first(body: &str) -> Self {
        Self::with_generation(1, body)
    }

    /// Revision of the write replacing `self` with `body`.
    pub fn next(&self, body: &str) -> Self {
        Self::with_generation(self.generation + 1, body)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn with_generation(generation: u64, body: &str) -> Self {
        let mut digest = blake3::hash(body.as_bytes()).to_hex().to_string();
        digest.truncate(DIGEST_LENGTH);
        Self { generation, digest }
    }
}

impl FromStr for Revision {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ErrorKind::InvalidRevision(s.to_string());
        let (generation, digest) = s.split_once('-').ok_or_raise(invalid)?;
        let generation = generation.parse::<u64>().or_raise(invalid)?;
        if generation == 0 || digest.is_empty() || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            exn::bail!(invalid());
        }
        Ok(Self { generation, digest: digest.to_string() })
    }
}
