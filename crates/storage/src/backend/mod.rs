//! Queue backend trait and implementations.
//!
//! A backend is one staging directory. Producers write complete entries,
//! consumers list, read and finally delete them; deletion is the only
//! acknowledgement a queue knows about.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
use crate::Entry;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub(crate) type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;

/// Unified interface for staging queue backends.
///
/// # Visibility
/// Implementations must guarantee that an entry becomes visible to
/// [`list_stream()`](Self::list_stream), [`count()`](Self::count) and
/// [`read()`](Self::read) only once [`write()`](Self::write) has fully
/// completed. A consumer must never observe half an entry.
///
/// # Examples
///
/// ```
/// use gharvest_storage::{QueueBackend, error::Result};
///
/// async fn drain(backend: &dyn QueueBackend) -> Result<usize> {
///     let mut total = 0;
///     for entry in backend.list().await? {
///         total += backend.read(&entry.name).await?.len();
///         backend.delete(&entry.name).await?;
///     }
///     Ok(total)
/// }
/// ```
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Name of the queue (used for logging only).
    fn name(&self) -> &str;

    /// Stream all visible entries, in whatever order the backend yields them.
    fn list_stream(&self) -> EntryStream<'_>;

    /// Collect all visible entries.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self) -> Result<Vec<Entry>> {
        self.list_stream().try_collect().await
    }

    /// Number of visible entries; the queue depth used for backpressure.
    async fn count(&self) -> Result<usize> {
        self.list_stream().try_fold(0, |count, _| async move { Ok(count + 1) }).await
    }

    /// Check if an entry exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Read an entry's contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the entry
    /// does not exist.
    async fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Write an entry, replacing any entry with the same name.
    async fn write(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Delete an entry.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the entry
    /// does not exist.
    async fn delete(&self, name: &str) -> Result<()>;
}
