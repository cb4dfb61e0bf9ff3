//! # Processor
//!
//! Processor chain with part-scoped error handling.
//!
//! Responsibilities:
//! - Apply an ordered list of stages to each batch (`Chain`)
//! - `try` / `catch` branching: failed parts skip the rest of a `try` block
//!   and are routed into the next `catch` block
//! - Built-in processors resolved through an explicit `ProcessorRegistry`
//! - Multi-worker pipeline stage moving `Transaction`s from input to output
//!
//! ## Usage
//!
//! ```ignore
//! use processor::{ProcessorRegistry, ProcessorPipeline};
//!
//! let registry = ProcessorRegistry::with_builtins();
//! let chain = registry.build_chain(&config.pipeline.processors, &caches)?;
//! let pipeline = ProcessorPipeline::spawn(chain, config.pipeline.threads, input_rx, output_tx);
//! ```

mod branch;
mod chain;
mod pipeline;
pub mod processors;
mod registry;

pub use branch::{CatchProcessor, TryProcessor};
pub use chain::Chain;
pub use pipeline::{PipelineMetrics, ProcessorPipeline};
pub use registry::{BuildContext, ProcessorFactory, ProcessorRegistry};

// Re-export contracts types
pub use contracts::{Batch, MessagePart, PartError, Processor};
