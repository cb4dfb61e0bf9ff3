//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Delivery Model
//! - A `Transaction` pairs a `Batch` with a single-use `AckHandle`
//! - Ownership of the batch and of its Ack obligation move together, hop by hop
//! - Delivery is at-least-once: a nacked batch may be redelivered by its origin

mod cache;
mod config;
mod error;
mod message;
mod processor;
mod transaction;
mod writer;

pub use cache::Cache;
pub use config::*;
pub use error::*;
pub use message::{Batch, MessagePart, PartError};
pub use processor::Processor;
pub use transaction::{AckHandle, AckReceiver, AckResult, Transaction};
pub use writer::{LocalWriter, Writer, WriterState};
