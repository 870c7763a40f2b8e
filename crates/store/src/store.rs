//! Keyed, revision-guarded document storage.

use crate::error::Result;
use crate::models::{RepoDocument, Revision};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of [`DocumentStore::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Written(Revision),
    /// The supplied revision is not the current one (or no revision was
    /// supplied for a document that already exists). Nothing was written.
    Conflict,
}

/// Document store with optimistic concurrency.
///
/// Updating an existing document requires the revision returned by the most
/// recent [`get`](Self::get) or [`insert`](Self::insert).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<(RepoDocument, Revision)>>;

    /// Create (`revision` is `None`) or replace (`revision` is current) the
    /// document at `key`.
    async fn insert(&self, key: &str, document: &RepoDocument, revision: Option<&Revision>) -> Result<Upsert>;

    /// Number of stored documents.
    async fn count(&self) -> Result<u64>;
}

pub type StoreHandle = Arc<dyn DocumentStore + Send + Sync>;
