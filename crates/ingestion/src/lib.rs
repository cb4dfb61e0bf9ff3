//! # Ingestion Pipeline
//!
//! Input side of a stream.
//!
//! Responsibilities:
//! - Read batches from a [`BatchSource`]
//! - Wrap every delivery in a fresh `Transaction` and await its ack
//! - Redeliver nacked batches (at-least-once) within a redelivery budget
//! - Bound unresolved batches with `max_pending`
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, StaticSource};
//!
//! let mut pipeline = IngestionPipeline::new(config.input.clone());
//! let rx = pipeline.take_receiver().unwrap();
//! // hand `rx` to the processor pipeline
//! let report = pipeline.run(StaticSource::from_payloads(["a", "b"])).await?;
//! println!("{}", report.summary);
//! ```

mod error;
mod metrics;
mod pipeline;
mod source;

pub use error::{IngestionError, Result};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use pipeline::{IngestionPipeline, IngestionReport};
pub use source::{BatchSource, LineSource, StaticSource};
