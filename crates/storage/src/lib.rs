pub mod backend;
pub mod error;
mod models;
mod path;
mod queue;

pub use crate::backend::QueueBackend;
pub use crate::models::Entry;
pub use crate::path::validate as validate_name;
pub use crate::queue::Queue;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn QueueBackend + Send + Sync>;
