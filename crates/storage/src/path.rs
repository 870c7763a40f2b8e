//! Entry name validation.
//!
//! Queues are flat directories: every entry is a single file directly inside
//! the queue root. Names are opaque tokens chosen by producers, so anything
//! that could escape the root or collide with in-flight writes is rejected.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path};

/// Prefix reserved for files that are still being written.
pub(crate) const PARTIAL_PREFIX: char = '.';

/// Validates a queue entry name.
///
/// # Examples
///
/// ```
/// use gharvest_storage::validate_name;
/// assert!(validate_name("3f0c2a52__00001").is_ok());
/// assert!(validate_name("d8b1.json").is_ok());
/// assert!(validate_name("../etc/passwd").is_err());
/// assert!(validate_name("nested/name").is_err());
/// assert!(validate_name(".hidden").is_err());
/// ```
pub fn validate(name: &str) -> Result<&str> {
    if name.is_empty() || name.starts_with(PARTIAL_PREFIX) || name.contains('\0') {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    // Path::components() is used so that both separators are caught on
    // platforms where backslashes are separators too.
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('/') && !name.contains('\\') => Ok(name),
        _ => exn::bail!(ErrorKind::InvalidName(name.to_string())),
    }
}

/// Whether a directory entry is visible to consumers.
pub(crate) fn is_visible(name: &str) -> bool {
    !name.starts_with(PARTIAL_PREFIX)
}
