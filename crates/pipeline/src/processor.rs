//! Turns raw event batches into consolidated repository sets.

use crate::error::{ErrorKind, Result};
use crate::stage::{Stage, Tick};
use async_trait::async_trait;
use exn::ResultExt;
use gharvest_extract::RepoSet;
use gharvest_storage::Queue;

pub const CONSOLIDATED_SUFFIX: &str = ".json";

pub struct BatchProcessor {
    extracted: Queue,
    processed: Queue,
    /// Stop writing once the processed queue holds this many entries.
    maximum_queued: usize,
}

impl BatchProcessor {
    pub fn new(extracted: Queue, processed: Queue, maximum_queued: usize) -> Self {
        Self { extracted, processed, maximum_queued }
    }

    async fn downstream_full(&self) -> Result<bool> {
        let depth = self.processed.depth().await.or_raise(|| ErrorKind::Queue)?;
        Ok(depth >= self.maximum_queued)
    }

    /// Consolidate one batch and acknowledge it.
    ///
    /// The consolidated file is written before the batch is acknowledged, so
    /// a crash in between reprocesses the batch rather than losing it.
    #[tracing::instrument(level = "debug", skip(self))]
    async fn process(&self, batch: &str) -> Result<Option<String>> {
        let bytes = self.extracted.read(batch).await.or_raise(|| ErrorKind::Queue)?;
        let text = String::from_utf8_lossy(&bytes);
        let (repos, report) = RepoSet::from_batch(&text);
        tracing::debug!(
            batch,
            lines = report.lines,
            malformed = report.malformed,
            duplicates = report.duplicates,
            repos = repos.len(),
            "Parsed batch"
        );

        let written = if repos.is_empty() {
            tracing::warn!(batch, lines = report.lines, "Batch held no repositories");
            None
        } else {
            let json = repos.to_json().or_raise(|| ErrorKind::Queue)?;
            let name = self.processed.enqueue(&json, CONSOLIDATED_SUFFIX).await.or_raise(|| ErrorKind::Queue)?;
            Some(name)
        };
        self.extracted.acknowledge(batch).await.or_raise(|| ErrorKind::Queue)?;
        Ok(written)
    }
}

#[async_trait]
impl Stage for BatchProcessor {
    fn name(&self) -> &'static str {
        "processor"
    }

    async fn tick(&mut self) -> Tick {
        match self.downstream_full().await {
            Ok(true) => {
                tracing::info!(maximum = self.maximum_queued, "Hit max queue count for processed files, waiting");
                return Tick::Saturated;
            },
            Ok(false) => {},
            Err(e) => {
                tracing::error!(error = ?e, "Could not count processed files");
                return Tick::Failed;
            },
        }
        let batches = match self.extracted.entries().await {
            Ok(batches) if batches.is_empty() => {
                tracing::info!("No extracted batches to process, waiting");
                return Tick::Idle;
            },
            Ok(batches) => batches,
            Err(e) => {
                tracing::error!(error = ?e, "Could not list extracted batches");
                return Tick::Failed;
            },
        };

        tracing::info!(count = batches.len(), "Found batches to process");
        let mut processed = 0;
        for batch in &batches {
            match self.downstream_full().await {
                Ok(false) => {},
                Ok(true) => {
                    tracing::info!(processed, "Processed queue filled up, pausing");
                    return Tick::Saturated;
                },
                Err(e) => {
                    tracing::error!(error = ?e, "Could not count processed files");
                    return Tick::Failed;
                },
            }
            match self.process(&batch.name).await {
                Ok(written) => {
                    processed += 1;
                    tracing::info!(batch = %batch.name, consolidated = ?written, "Finished processing batch");
                },
                Err(e) => tracing::error!(batch = %batch.name, error = ?e, "Could not process batch"),
            }
        }
        if processed == 0 { Tick::Failed } else { Tick::Worked }
    }
}
