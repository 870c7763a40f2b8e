//! Named staging queue.

use crate::error::Result;
use crate::{BackendHandle, Entry};
use std::fmt;
use uuid::Uuid;

/// A staging queue between two pipeline stages.
///
/// Producers [`enqueue`](Self::enqueue) complete payloads; consumers list
/// [`entries`](Self::entries), [`read`](Self::read) one, and finally
/// [`acknowledge`](Self::acknowledge) it. An entry that was read but never
/// acknowledged is seen again after a restart.
#[derive(Clone)]
pub struct Queue {
    backend: BackendHandle,
}

impl Queue {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Number of entries waiting to be consumed.
    pub async fn depth(&self) -> Result<usize> {
        self.backend.count().await
    }

    pub async fn entries(&self) -> Result<Vec<Entry>> {
        self.backend.list().await
    }

    /// Enqueue a payload under a fresh opaque name, returning that name.
    ///
    /// The name is a random UUID followed by `suffix` (which may be empty).
    pub async fn enqueue(&self, data: &[u8], suffix: &str) -> Result<String> {
        let name = format!("{}{suffix}", Uuid::new_v4());
        self.enqueue_named(&name, data).await?;
        Ok(name)
    }

    /// Enqueue a payload under a caller-chosen name.
    pub async fn enqueue_named(&self, name: &str, data: &[u8]) -> Result<()> {
        self.backend.write(name, data).await?;
        tracing::trace!(queue = self.name(), entry = name, bytes = data.len(), "Enqueued entry");
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.backend.read(name).await
    }

    /// Mark an entry as consumed by deleting it.
    pub async fn acknowledge(&self, name: &str) -> Result<()> {
        self.backend.delete(name).await?;
        tracing::trace!(queue = self.name(), entry = name, "Acknowledged entry");
        Ok(())
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("name", &self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn queue() -> (tempfile::TempDir, Queue) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("extracted", dir.path()).unwrap();
        (dir, Queue::new(Arc::new(backend)))
    }

    #[tokio::test]
    async fn test_enqueue_generates_unique_names() {
        let (_dir, queue) = queue();
        let first = queue.enqueue(b"one", ".json").await.unwrap();
        let second = queue.enqueue(b"two", ".json").await.unwrap();
        assert_ne!(first, second);
        assert!(first.ends_with(".json"));
        assert_eq!(queue.depth().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_acknowledge_reduces_depth() {
        let (_dir, queue) = queue();
        let name = queue.enqueue(b"payload", "").await.unwrap();
        assert_eq!(queue.read(&name).await.unwrap(), b"payload");
        queue.acknowledge(&name).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unacknowledged_entries_survive_reopen() {
        let (dir, queue) = queue();
        queue.enqueue_named("batch__00001", b"line\n").await.unwrap();
        drop(queue);

        let reopened = Queue::new(Arc::new(LocalBackend::new("extracted", dir.path()).unwrap()));
        let entries = reopened.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "batch__00001");
    }

    #[tokio::test]
    async fn test_enqueue_named_rejects_invalid_names() {
        let (_dir, queue) = queue();
        let err = queue.enqueue_named("../outside", b"data").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(_)));
    }
}
