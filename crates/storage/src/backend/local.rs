//! Local filesystem queue backend.
//!
//! One directory per queue. Writes land in a hidden partial file first and
//! are renamed into place, so a rename is the moment an entry is enqueued.

use crate::backend::EntryStream;
use crate::error::{ErrorKind, Result};
use crate::path::{PARTIAL_PREFIX, is_visible, validate as validate_name};
use crate::{Entry, QueueBackend};
use async_stream::stream;
use async_trait::async_trait;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncWriteExt;

const PARTIAL_SUFFIX: &str = ".partial";

/// Partial files older than this were abandoned by a writer that died before
/// renaming them.
const STALE_PARTIAL: Duration = Duration::from_secs(60 * 60);

/// Local filesystem queue backend.
///
/// # Examples
///
/// ```no_run
/// use gharvest_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("extracted", "/var/lib/gharvest/extracted")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Queue directory
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local queue backend, creating the directory if needed.
    ///
    /// Stale partial files left behind by a crashed writer are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidRoot(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidRoot(root.display().to_string()));
            }
        } else {
            // Only happens once on startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root.display().to_string()))?;
        }
        let backend = Self { name: name.into(), root };
        backend.sweep_partials(SystemTime::now());
        Ok(backend)
    }

    fn sweep_partials(&self, now: SystemTime) {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(queue = %self.name, error = %e, "Could not scan for partial files");
                return;
            },
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };
            if is_visible(file_name) || !file_name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else { continue };
            if now.duration_since(modified).unwrap_or_default() < STALE_PARTIAL {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => tracing::info!(queue = %self.name, file = file_name, "Removed stale partial file"),
                Err(e) => tracing::warn!(queue = %self.name, file = file_name, error = %e, "Could not remove partial file"),
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_name(name)?))
    }

    fn partial_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{PARTIAL_PREFIX}{name}{PARTIAL_SUFFIX}"))
    }

    fn metadata(name: String, metadata: Metadata) -> Result<Entry> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(Entry::new(name, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, name: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(name.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(name.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn process_entry(entry: DirEntry) -> Result<Option<Entry>> {
        let Ok(name) = entry.file_name().into_string() else {
            // Nothing we produce is non-UTF8; somebody else put it there.
            tracing::debug!(path = %entry.path().display(), "Ignoring non-UTF8 queue entry");
            return Ok(None);
        };
        if !is_visible(&name) {
            return Ok(None);
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            // Consumed between read_dir() and metadata(); not an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => exn::bail!(Self::map_io_error(e, &name)),
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        Self::metadata(name, metadata).map(Some)
    }
}

#[async_trait]
impl QueueBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> EntryStream<'_> {
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(err) => {
                    yield Err(exn::Exn::from(Self::map_io_error(err, &self.name)));
                    return;
                },
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &self.name))); break; },
                };
                match Self::process_entry(entry).await {
                    Ok(Some(entry)) => yield Ok(entry),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.entry_path(name)?;
        Ok(fs::try_exists(&path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.entry_path(name)?;
        Ok(fs::read(&path).await.map_err(|e| Self::map_io_error(e, name))?)
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.entry_path(name)?;
        let partial = self.partial_path(name);
        let mut file = fs::File::create(&partial).await.map_err(|e| Self::map_io_error(e, name))?;
        file.write_all(data).await.map_err(ErrorKind::Io)?;
        // The entry must be durable before it becomes visible, otherwise a
        // crash could leave a consumer with a truncated batch.
        file.sync_all().await.map_err(ErrorKind::Io)?;
        drop(file);
        if let Err(e) = fs::rename(&partial, &path).await {
            _ = fs::remove_file(&partial).await;
            exn::bail!(Self::map_io_error(e, name));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.entry_path(name)?;
        Ok(fs::remove_file(&path).await.map_err(|e| Self::map_io_error(e, name))?)
    }
}
