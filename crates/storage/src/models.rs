//! Storage models.

use time::UtcDateTime;

/// A single queued item, as returned by backend listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Opaque entry name (unique within its queue)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp; entries are made visible atomically, so this
    /// is effectively the enqueue time.
    pub modified: UtcDateTime,
}
impl Entry {
    pub fn new(name: impl Into<String>, size: u64, modified: UtcDateTime) -> Self {
        Self { name: name.into(), size, modified }
    }
}
