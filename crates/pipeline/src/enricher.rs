//! Enriches every repository named in the consolidated files.
//!
//! Per repository, in order: read the stored revision, fetch API metadata,
//! fetch the default branch tree, scrape the public page, and write the
//! document back under the revision that was read. A failure at any step
//! abandons only that repository.

use crate::error::{ErrorKind, Result};
use crate::stage::{Stage, Tick};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use gharvest_extract::{PageMetricsExtractor, RepoSet};
use gharvest_fetch::{Fetched, RateLimitedFetcher, Response, StatusCode, TransportHandle};
use gharvest_storage::Queue;
use gharvest_store::{RepoDocument, ScrapedInformation, StoreHandle, Upsert};
use serde_json::{Map, Value};
use std::sync::Arc;
use time::UtcDateTime;

/// Metadata keys containing this are dropped before storage.
const STRIPPED_KEY_MARKER: &str = "url";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichSettings {
    pub api_url: String,
    pub page_url: String,
    /// Trees with more top-level entries than this are not stored.
    pub max_tree_entries: usize,
}

/// Running totals since the enricher started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub files_processed: u64,
    pub repos_processed: u64,
    /// Repositories with no stored document yet.
    pub new_repos: u64,
    /// Repositories that already had a document, which is then refreshed.
    pub already_scanned_repos: u64,
    pub enriched: u64,
    pub abandoned: u64,
    pub conflicts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Written,
    Conflict,
}

pub struct Enricher {
    processed: Queue,
    store: StoreHandle,
    api: RateLimitedFetcher,
    pages: TransportHandle,
    extractor: Arc<dyn PageMetricsExtractor>,
    settings: EnrichSettings,
    stats: EnrichStats,
}

impl Enricher {
    pub fn new(
        processed: Queue,
        store: StoreHandle,
        api: RateLimitedFetcher,
        pages: TransportHandle,
        extractor: Arc<dyn PageMetricsExtractor>,
        settings: EnrichSettings,
    ) -> Self {
        let settings = EnrichSettings {
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            page_url: settings.page_url.trim_end_matches('/').to_string(),
            ..settings
        };
        Self { processed, store, api, pages, extractor, settings, stats: EnrichStats::default() }
    }

    pub fn stats(&self) -> EnrichStats {
        self.stats
    }

    /// Enrich every repository in one consolidated file, then acknowledge it.
    ///
    /// A file that cannot be parsed is acknowledged too; it would fail the
    /// same way on every retry.
    async fn process_file(&mut self, file: &str) -> Result<()> {
        let bytes = self.processed.read(file).await.or_raise(|| ErrorKind::Queue)?;
        match RepoSet::from_json(&bytes) {
            Ok(repos) => {
                self.stats.files_processed += 1;
                tracing::debug!(file, repos = repos.len(), "Processing file");
                for repo in repos.names() {
                    self.enrich_logged(repo).await;
                }
            },
            Err(e) => tracing::error!(file, error = ?e, "Unreadable consolidated file, discarding"),
        }
        tracing::info!(file, "Finished processing file, cleaning up");
        self.processed.acknowledge(file).await.or_raise(|| ErrorKind::Queue)
    }

    async fn enrich_logged(&mut self, repo: &str) {
        self.stats.repos_processed += 1;
        match self.enrich(repo).await {
            Ok(Outcome::Written) => self.stats.enriched += 1,
            Ok(Outcome::Conflict) => {
                self.stats.conflicts += 1;
                tracing::warn!(repo, "Document changed since it was read, skipping");
            },
            Err(e) => {
                self.stats.abandoned += 1;
                tracing::warn!(repo, error = ?e, "Abandoned repository");
            },
        }
        let stats = &self.stats;
        tracing::info!(
            files = stats.files_processed,
            repos = stats.repos_processed,
            new = stats.new_repos,
            already_scanned = stats.already_scanned_repos,
            enriched = stats.enriched,
            abandoned = stats.abandoned,
            conflicts = stats.conflicts,
            "Enrichment progress"
        );
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn enrich(&mut self, repo: &str) -> Result<Outcome> {
        let current = self.store.get(repo).await.or_raise(|| ErrorKind::Store)?;
        if current.is_some() {
            self.stats.already_scanned_repos += 1;
        } else {
            self.stats.new_repos += 1;
        }

        let metadata_url = format!("{}/repos/{repo}", self.settings.api_url);
        let metadata = self.fetch_api(&metadata_url, repo).await?;
        let mut api_response: Map<String, Value> =
            metadata.json(&metadata_url).or_raise(|| ErrorKind::InvalidResponse(metadata_url.clone()))?;
        let branch = api_response
            .get("default_branch")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_raise(|| ErrorKind::InvalidResponse(metadata_url.clone()))?;
        api_response.retain(|key, _| !key.contains(STRIPPED_KEY_MARKER));

        let tree_url = format!("{}/repos/{repo}/git/trees/{branch}", self.settings.api_url);
        let tree = self.fetch_api(&tree_url, repo).await?;
        let tree: Value = tree.json(&tree_url).or_raise(|| ErrorKind::InvalidResponse(tree_url.clone()))?;
        let entries = tree
            .get("tree")
            .and_then(Value::as_array)
            .map(Vec::len)
            .ok_or_raise(|| ErrorKind::InvalidResponse(tree_url.clone()))?;
        let file_tree = if entries > self.settings.max_tree_entries {
            tracing::warn!(repo, entries, maximum = self.settings.max_tree_entries, "Too many files, omitting tree");
            None
        } else {
            Some(tree)
        };

        let page_url = format!("{}/{repo}", self.settings.page_url);
        let page = self.pages.get(&page_url).await.or_raise(|| ErrorKind::Fetch)?;
        match page.status {
            StatusCode::NOT_FOUND => exn::bail!(ErrorKind::NotFound(page_url)),
            status if !status.is_success() => exn::bail!(ErrorKind::Rejected { url: page_url, status: status.as_u16() }),
            _ => {},
        }
        let metrics = self.extractor.extract(&page.text(), repo, &branch).or_raise(|| ErrorKind::Extract)?;

        let document = RepoDocument {
            api_response: Value::Object(api_response),
            file_tree,
            scraped_information: ScrapedInformation::new(metrics.contributors, metrics.commits, UtcDateTime::now()),
        };
        let revision = current.as_ref().map(|(_, revision)| revision);
        match self.store.insert(repo, &document, revision).await.or_raise(|| ErrorKind::Store)? {
            Upsert::Written(revision) => {
                tracing::debug!(repo, revision = %revision, "Stored document");
                Ok(Outcome::Written)
            },
            Upsert::Conflict => Ok(Outcome::Conflict),
        }
    }

    /// Fetch through the rate limiter, turning anything but a success into an
    /// error that abandons `repo`.
    async fn fetch_api(&mut self, url: &str, repo: &str) -> Result<Response> {
        let response = match self.api.fetch(url).await.or_raise(|| ErrorKind::Fetch)? {
            Fetched::Response(response) => response,
            Fetched::Removed => exn::bail!(ErrorKind::Removed(repo.to_string())),
        };
        match response.status {
            StatusCode::NOT_FOUND => {
                tracing::warn!(repo, url, "Got 404 for API request");
                exn::bail!(ErrorKind::NotFound(url.to_string()))
            },
            status if !status.is_success() => {
                exn::bail!(ErrorKind::Rejected { url: url.to_string(), status: status.as_u16() })
            },
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl Stage for Enricher {
    fn name(&self) -> &'static str {
        "enricher"
    }

    async fn tick(&mut self) -> Tick {
        let files = match self.processed.entries().await {
            Ok(files) if files.is_empty() => {
                tracing::info!("No processed files to enrich, waiting");
                return Tick::Idle;
            },
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = ?e, "Could not list processed files");
                return Tick::Failed;
            },
        };
        let mut finished = 0;
        for file in &files {
            match self.process_file(&file.name).await {
                Ok(()) => finished += 1,
                Err(e) => tracing::error!(file = %file.name, error = ?e, "Could not process file"),
            }
        }
        if finished == 0 { Tick::Failed } else { Tick::Worked }
    }
}
