//! Keeps the extracted queue topped up from the hourly archive.

use crate::error::{ErrorKind, Result};
use crate::stage::{Stage, Tick};
use async_trait::async_trait;
use exn::ResultExt;
use gharvest_archive::{ARCHIVE_EXTENSION, SourceHandle, SplitReport, TimeCursor, decompress_file, split_into};
use gharvest_storage::Queue;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::BufReader;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Downloading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiverSettings {
    /// Refill once the extracted queue holds fewer entries than this.
    pub minimum_queued: usize,
    pub lines_per_batch: usize,
}

pub struct Archiver {
    source: SourceHandle,
    extracted: Queue,
    work_dir: PathBuf,
    cursor_path: PathBuf,
    cursor: TimeCursor,
    phase: Phase,
    settings: ArchiverSettings,
}

impl Archiver {
    pub fn new(
        source: SourceHandle,
        extracted: Queue,
        work_dir: impl Into<PathBuf>,
        cursor_path: impl Into<PathBuf>,
        cursor: TimeCursor,
        settings: ArchiverSettings,
    ) -> Self {
        Self {
            source,
            extracted,
            work_dir: work_dir.into(),
            cursor_path: cursor_path.into(),
            cursor,
            phase: Phase::Idle,
            settings,
        }
    }

    /// Resolve the starting cursor for `cursor_path`.
    ///
    /// A persisted cursor always wins over `start`, so restarting with the
    /// same command line never rewinds. Without either there is nothing to
    /// fetch.
    pub async fn initial_cursor(cursor_path: &Path, start: Option<TimeCursor>) -> Result<TimeCursor> {
        if let Some(stored) = TimeCursor::load(cursor_path).await.or_raise(|| ErrorKind::Archive)? {
            if let Some(start) = start
                && start != stored
            {
                tracing::warn!(stored = %stored, ignored = %start, "Cursor file exists, ignoring start");
            }
            return Ok(stored);
        }
        let Some(start) = start else {
            exn::bail!(ErrorKind::NoCursor);
        };
        start.save(cursor_path).await.or_raise(|| ErrorKind::Archive)?;
        tracing::info!(cursor = %start, "Initialised cursor");
        Ok(start)
    }

    pub fn cursor(&self) -> TimeCursor {
        self.cursor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Download, decompress and split the archive at the current cursor.
    ///
    /// Intermediate files are removed whether or not the cycle succeeds.
    #[tracing::instrument(level = "debug", skip(self), fields(archive = %self.cursor))]
    async fn cycle(&self) -> Result<SplitReport> {
        let name = self.cursor.archive_name();
        fs::create_dir_all(&self.work_dir).await.or_raise(|| ErrorKind::Archive)?;
        let compressed = self.work_dir.join(format!("{name}{ARCHIVE_EXTENSION}"));
        let decompressed = self.work_dir.join(format!("{name}.json"));

        let result = self.download_and_split(&name, &compressed, &decompressed).await;
        for path in [&compressed, &decompressed] {
            if let Err(e) = fs::remove_file(path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove intermediate file");
            }
        }
        result
    }

    async fn download_and_split(&self, name: &str, compressed: &Path, decompressed: &Path) -> Result<SplitReport> {
        let bytes = self.source.download(name, compressed).await.or_raise(|| ErrorKind::Archive)?;
        tracing::debug!(archive = name, bytes, "Archive downloaded");
        decompress_file(compressed, decompressed).await.or_raise(|| ErrorKind::Archive)?;
        fs::remove_file(compressed).await.or_raise(|| ErrorKind::Archive)?;

        let reader = BufReader::new(fs::File::open(decompressed).await.or_raise(|| ErrorKind::Archive)?);
        let prefix = Uuid::new_v4().to_string();
        split_into(&self.extracted, reader, self.settings.lines_per_batch, &prefix)
            .await
            .or_raise(|| ErrorKind::Archive)
    }
}

#[async_trait]
impl Stage for Archiver {
    fn name(&self) -> &'static str {
        "archiver"
    }

    async fn tick(&mut self) -> Tick {
        let depth = match self.extracted.depth().await {
            Ok(depth) => depth,
            Err(e) => {
                tracing::error!(queue = self.extracted.name(), error = ?e, "Could not count queued batches");
                return Tick::Failed;
            },
        };
        if depth >= self.settings.minimum_queued {
            tracing::info!(depth, minimum = self.settings.minimum_queued, "Enough batches queued, waiting");
            return Tick::Saturated;
        }
        if self.phase == Phase::Downloading {
            return Tick::Idle;
        }

        tracing::info!(depth, archive = %self.cursor, "Queue below minimum, fetching archive");
        self.phase = Phase::Downloading;
        let outcome = self.cycle().await;
        self.phase = Phase::Idle;

        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(archive = %self.cursor, error = ?e, "Archive cycle failed, will retry");
                return Tick::Failed;
            },
        };
        let finished = self.cursor;
        self.cursor.advance();
        if let Err(e) = self.cursor.save(&self.cursor_path).await {
            tracing::error!(cursor = %self.cursor, error = ?e, "Could not persist cursor");
            return Tick::Failed;
        }
        tracing::info!(
            archive = %finished,
            shards = report.shards.len(),
            lines = report.lines,
            next = %self.cursor,
            "Archive queued"
        );
        Tick::Worked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use gharvest_archive::FileArchiveSource;
    use gharvest_storage::backend::MockBackend;
    use std::io::Write;
    use std::sync::Arc;

    const SETTINGS: ArchiverSettings = ArchiverSettings { minimum_queued: 3, lines_per_batch: 2 };

    fn start() -> TimeCursor {
        TimeCursor::new(2015, 1, 28, 23).unwrap()
    }

    fn publish(mirror: &Path, cursor: TimeCursor, lines: usize) {
        let text: String = (0..lines)
            .map(|i| format!(r#"{{"repo":{{"name":"org/repo{i}","url":"https://api.github.com/repos/org/repo{i}"}}}}"#) + "\n")
            .collect();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        let path = mirror.join(format!("{}{ARCHIVE_EXTENSION}", cursor.archive_name()));
        std::fs::write(path, encoder.finish().unwrap()).unwrap();
    }

    struct Fixture {
        mirror: tempfile::TempDir,
        state: tempfile::TempDir,
        extracted: Queue,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                mirror: tempfile::tempdir().unwrap(),
                state: tempfile::tempdir().unwrap(),
                extracted: Queue::new(Arc::new(MockBackend::default().with_name("extracted"))),
            }
        }

        fn cursor_path(&self) -> PathBuf {
            self.state.path().join("cursor.json")
        }

        fn archiver(&self, cursor: TimeCursor) -> Archiver {
            Archiver::new(
                Arc::new(FileArchiveSource::new(self.mirror.path())),
                self.extracted.clone(),
                self.state.path().join("work"),
                self.cursor_path(),
                cursor,
                SETTINGS,
            )
        }
    }

    #[tokio::test]
    async fn test_cycle_splits_and_advances() {
        let fixture = Fixture::new();
        publish(fixture.mirror.path(), start(), 5);
        let mut archiver = fixture.archiver(start());

        assert_eq!(archiver.tick().await, Tick::Worked);
        assert_eq!(fixture.extracted.depth().await.unwrap(), 3);
        assert_eq!(archiver.cursor(), TimeCursor::new(2015, 2, 1, 0).unwrap());
        assert_eq!(archiver.phase(), Phase::Idle);
        assert_eq!(TimeCursor::load(fixture.cursor_path()).await.unwrap(), Some(archiver.cursor()));

        // Intermediates are gone.
        let work: Vec<_> = std::fs::read_dir(fixture.state.path().join("work")).unwrap().collect();
        assert!(work.is_empty());
    }

    #[tokio::test]
    async fn test_saturated_queue_does_not_download() {
        let fixture = Fixture::new();
        publish(fixture.mirror.path(), start(), 5);
        for i in 0..3 {
            fixture.extracted.enqueue_named(&format!("old__{i:05}"), b"line\n").await.unwrap();
        }
        let mut archiver = fixture.archiver(start());

        assert_eq!(archiver.tick().await, Tick::Saturated);
        assert_eq!(archiver.cursor(), start());
        assert_eq!(fixture.extracted.depth().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_archive_keeps_cursor() {
        let fixture = Fixture::new();
        let mut archiver = fixture.archiver(start());

        assert_eq!(archiver.tick().await, Tick::Failed);
        assert_eq!(archiver.cursor(), start());
        assert_eq!(archiver.phase(), Phase::Idle);
        assert_eq!(TimeCursor::load(fixture.cursor_path()).await.unwrap(), None);

        // Once the hour is published, the same hour is fetched.
        publish(fixture.mirror.path(), start(), 1);
        assert_eq!(archiver.tick().await, Tick::Worked);
        assert_eq!(fixture.extracted.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refills_until_minimum() {
        let fixture = Fixture::new();
        let second = start().next();
        publish(fixture.mirror.path(), start(), 2);
        publish(fixture.mirror.path(), second, 4);
        let mut archiver = fixture.archiver(start());

        assert_eq!(archiver.tick().await, Tick::Worked);
        assert_eq!(archiver.tick().await, Tick::Worked);
        assert_eq!(fixture.extracted.depth().await.unwrap(), 3);
        assert_eq!(archiver.tick().await, Tick::Saturated);
        assert_eq!(archiver.cursor(), second.next());
    }

    #[tokio::test]
    async fn test_initial_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");

        let err = Archiver::initial_cursor(&path, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoCursor));

        assert_eq!(Archiver::initial_cursor(&path, Some(start())).await.unwrap(), start());
        assert_eq!(TimeCursor::load(&path).await.unwrap(), Some(start()));

        // A stored cursor is never rewound by a later start.
        let later = start().next();
        later.save(&path).await.unwrap();
        assert_eq!(Archiver::initial_cursor(&path, Some(start())).await.unwrap(), later);
    }
}
