//! In-memory queue backend for testing.

use super::EntryStream;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_name;
use crate::{Entry, QueueBackend};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory queue backend for testing.
///
/// Entries live in a [`BTreeMap`] behind a [`RwLock`], so listings come back
/// in name order, which keeps assertions in dependent crates deterministic.
///
/// # Examples
///
/// ```
/// use gharvest_storage::backend::MockBackend;
/// use gharvest_storage::QueueBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("batch__00001", "{}\n")]);
/// assert_eq!(backend.count().await?, 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<String, (UtcDateTime, Vec<u8>)>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with entries.
    ///
    /// Panics on invalid entry names: a broken test fixture should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let storage = files
            .into_iter()
            .map(|(name, data)| {
                let name = name.into();
                if validate_name(&name).is_err() {
                    panic!("MockBackend::with_files: invalid entry name {name}");
                }
                (name, (now, data.into()))
            })
            .collect();
        Self { name: "mock".to_string(), storage: RwLock::new(storage) }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl QueueBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> EntryStream<'_> {
        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let entries: Vec<Entry> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .map(|(name, (inserted, data))| Entry::new(name.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            for entry in entries {
                yield Ok(entry);
            }
        })
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        Ok(self.storage.read().await.contains_key(name))
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let name = validate_name(name)?;
        let guard = self.storage.read().await;
        let (_, data) = guard.get(name).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(name.to_string())))?;
        Ok(data.clone())
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let name = validate_name(name)?;
        self.storage.write().await.insert(name.to_string(), (UtcDateTime::now(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        match self.storage.write().await.remove(name) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(name.to_string())),
        }
    }
}
