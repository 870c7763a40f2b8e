//! Document store for enriched repositories.
//!
//! One JSON document per repository, keyed by `owner/name`. Writes are
//! guarded by a [`Revision`]: a writer must present the revision it last read,
//! and a stale one yields [`Upsert::Conflict`] instead of overwriting.

mod db;
pub mod error;
mod memory;
mod models;
mod sqlite;
mod store;

pub use crate::db::Database;
pub use crate::memory::MemoryStore;
pub use crate::models::{RepoDocument, Revision, ScrapedInformation};
pub use crate::sqlite::SqliteStore;
pub use crate::store::{DocumentStore, StoreHandle, Upsert};
