//! In-memory [`DocumentStore`] with the same revision rules as SQLite.

use crate::error::Result;
use crate::models::{RepoDocument, Revision};
use crate::store::{DocumentStore, Upsert};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Documents are kept encoded, so revisions digest exactly what SQLite would
/// have stored.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, (String, Revision)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.documents.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<(RepoDocument, Revision)>> {
        let documents = self.documents.read().await;
        let Some((body, revision)) = documents.get(key) else {
            return Ok(None);
        };
        Ok(Some((RepoDocument::decode(body)?, revision.clone())))
    }

    async fn insert(&self, key: &str, document: &RepoDocument, revision: Option<&Revision>) -> Result<Upsert> {
        let body = document.encode()?;
        let mut documents = self.documents.write().await;
        let next = match (documents.get(key), revision) {
            (None, None) => Revision::first(&body),
            (Some((_, stored)), Some(supplied)) if stored == supplied => supplied.next(&body),
            _ => return Ok(Upsert::Conflict),
        };
        documents.insert(key.to_string(), (body, next.clone()));
        Ok(Upsert::Written(next))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.documents.read().await.len() as u64)
    }
}
