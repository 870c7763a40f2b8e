//! The three harvesting stages and the loop that drives them.
//!
//! Stages never share memory. The archiver feeds the extracted queue, the
//! processor turns extracted batches into consolidated files, and the
//! enricher turns consolidated files into stored documents. Each can be
//! stopped at any point and resumed from what is on disk.

mod archiver;
mod enricher;
pub mod error;
mod processor;
mod stage;

pub use crate::archiver::{Archiver, ArchiverSettings, Phase};
pub use crate::enricher::{EnrichSettings, EnrichStats, Enricher};
pub use crate::processor::{BatchProcessor, CONSOLIDATED_SUFFIX};
pub use crate::stage::{Stage, Tick, run};

#[cfg(test)]
mod tests {
    use super::*;
    use gharvest_extract::RepoSet;
    use gharvest_storage::Queue;
    use gharvest_storage::backend::MockBackend;
    use std::sync::Arc;

    /// An archive hour with `A/B` twice and `C/D` once becomes exactly one
    /// consolidated file with two repositories.
    #[tokio::test]
    async fn test_archive_to_consolidated_file() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use gharvest_archive::{FileArchiveSource, TimeCursor};
        use std::io::Write;

        let mirror = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cursor = TimeCursor::new(2015, 1, 1, 15).unwrap();
        let lines = [
            r#"{"type":"PushEvent","repo":{"name":"A/B","url":"https://api.github.com/repos/A/B"}}"#,
            r#"{"type":"WatchEvent","repo":{"name":"C/D","url":"https://api.github.com/repos/C/D"}}"#,
            r#"{"type":"IssuesEvent","repo":{"name":"A/B","url":"https://api.github.com/repos/A/B"}}"#,
        ];
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(lines.join("\n").as_bytes()).unwrap();
        std::fs::write(mirror.path().join("2015-01-01-15.json.gz"), encoder.finish().unwrap()).unwrap();

        let extracted = Queue::new(Arc::new(MockBackend::default().with_name("extracted")));
        let processed = Queue::new(Arc::new(MockBackend::default().with_name("processed")));
        let mut archiver = Archiver::new(
            Arc::new(FileArchiveSource::new(mirror.path())),
            extracted.clone(),
            state.path().join("work"),
            state.path().join("cursor.json"),
            cursor,
            ArchiverSettings { minimum_queued: 1, lines_per_batch: 1000 },
        );
        let mut processor = BatchProcessor::new(extracted.clone(), processed.clone(), 10);

        assert_eq!(archiver.tick().await, Tick::Worked);
        assert_eq!(processor.tick().await, Tick::Worked);
        assert_eq!(extracted.depth().await.unwrap(), 0);

        let files = processed.entries().await.unwrap();
        assert_eq!(files.len(), 1);
        let repos = RepoSet::from_json(&processed.read(&files[0].name).await.unwrap()).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos.get("A/B"), Some("https://api.github.com/repos/A/B"));
    }
}
