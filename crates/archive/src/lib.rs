//! Hourly event archives: which hour comes next, where to fetch it from, and
//! how to turn it into queued batches.

mod cursor;
mod decompress;
pub mod error;
mod source;
mod split;

pub use crate::cursor::TimeCursor;
pub use crate::decompress::{decompress_file, is_gzip};
pub use crate::source::{ARCHIVE_EXTENSION, ArchiveSource, FileArchiveSource, HttpArchiveSource, SourceHandle};
pub use crate::split::{SplitReport, shard_name, split_into};
