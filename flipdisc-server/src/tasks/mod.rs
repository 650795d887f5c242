//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod engine;
pub mod ingest;
pub mod status;

pub use engine::engine_task;
pub use ingest::{ingest_task, IngestTaskConfig};
pub use status::status_task;
