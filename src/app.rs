//! Builds stages from configuration.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use gharvest_archive::{HttpArchiveSource, TimeCursor};
use gharvest_config::{Config, Paths};
use gharvest_extract::GithubPageExtractor;
use gharvest_fetch::{HttpTransport, RateLimitedFetcher, RetryPolicy};
use gharvest_pipeline::{Archiver, ArchiverSettings, BatchProcessor, EnrichSettings, Enricher};
use gharvest_storage::Queue;
use gharvest_storage::backend::LocalBackend;
use gharvest_store::{Database, SqliteStore};
use std::sync::Arc;

pub struct App {
    config: Config,
    paths: Paths,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let paths = config.paths().or_raise(|| ErrorKind::Config)?;
        tracing::debug!(?paths, "Resolved paths");
        Ok(Self { config, paths })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    fn extracted(&self) -> Result<Queue> {
        let backend = LocalBackend::new("extracted", &self.paths.extracted).or_raise(|| ErrorKind::Queue("extracted"))?;
        Ok(Queue::new(Arc::new(backend)))
    }

    fn processed(&self) -> Result<Queue> {
        let backend = LocalBackend::new("processed", &self.paths.processed).or_raise(|| ErrorKind::Queue("processed"))?;
        Ok(Queue::new(Arc::new(backend)))
    }

    pub async fn archiver(&self, start: Option<TimeCursor>) -> Result<Archiver> {
        let cursor = Archiver::initial_cursor(&self.paths.cursor, start).await.or_raise(|| ErrorKind::Cursor)?;
        let source = HttpArchiveSource::new(&self.config.archive.base_url, &self.config.github.user_agent)
            .or_raise(|| ErrorKind::Client)?;
        Ok(Archiver::new(
            Arc::new(source),
            self.extracted()?,
            &self.paths.work,
            &self.paths.cursor,
            cursor,
            ArchiverSettings {
                minimum_queued: self.config.archive.minimum_queued,
                lines_per_batch: self.config.archive.lines_per_batch,
            },
        ))
    }

    pub fn processor(&self) -> Result<BatchProcessor> {
        Ok(BatchProcessor::new(self.extracted()?, self.processed()?, self.config.processor.maximum_queued))
    }

    /// The enricher and the database it writes to, which the caller closes on
    /// shutdown.
    pub async fn enricher(&self) -> Result<(Enricher, Database)> {
        let github = &self.config.github;
        if github.token.is_none() {
            tracing::warn!("No API token configured, unauthenticated rate limits apply");
        }
        let db = Database::connect(&self.paths.database).await.or_raise(|| ErrorKind::Store)?;
        let api = HttpTransport::api(&github.user_agent, github.token.as_deref()).or_raise(|| ErrorKind::Client)?;
        let pages = HttpTransport::page(&github.user_agent).or_raise(|| ErrorKind::Client)?;
        let policy = RetryPolicy {
            secondary_delay: self.config.rate_limit.secondary_delay(),
            max_attempts: self.config.rate_limit.max_attempts,
            reset_grace: self.config.rate_limit.reset_grace(),
        };
        let baseline = format!("{}/", github.api_url.trim_end_matches('/'));
        let fetcher = RateLimitedFetcher::connect(Arc::new(api), &baseline, policy)
            .await
            .or_raise(|| ErrorKind::Connect)?;
        let enricher = Enricher::new(
            self.processed()?,
            Arc::new(SqliteStore::from(&db)),
            fetcher,
            Arc::new(pages),
            Arc::new(GithubPageExtractor),
            EnrichSettings {
                api_url: github.api_url.clone(),
                page_url: github.page_url.clone(),
                max_tree_entries: self.config.enrich.max_tree_entries,
            },
        );
        Ok((enricher, db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(dir: &std::path::Path) -> App {
        let mut config = Config::default();
        config.paths.data_dir = Some(dir.to_path_buf());
        App::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_archiver_requires_start_or_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        assert!(app.archiver(None).await.is_err());

        let start: TimeCursor = "2015-01-01-15".parse().unwrap();
        let archiver = app.archiver(Some(start)).await.unwrap();
        assert_eq!(archiver.cursor(), start);
        assert!(app.paths().cursor.exists());
    }

    #[test]
    fn test_processor_creates_queues() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        app.processor().unwrap();
        assert!(dir.path().join("extracted").is_dir());
        assert!(dir.path().join("processed").is_dir());
    }
}
