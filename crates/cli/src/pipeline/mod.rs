//! Stream orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Stream, StreamOptions};
pub use stats::StreamStats;
