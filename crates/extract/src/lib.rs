mod consts;
pub mod error;
mod events;
mod metrics;
mod number;

pub use crate::events::{BatchReport, RepoSet, parse_event_line};
pub use crate::metrics::{GithubPageExtractor, PageMetrics, PageMetricsExtractor};
pub use crate::number::text_to_number;
