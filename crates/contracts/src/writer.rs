//! Writer trait - output connector interface
//!
//! Lifecycle: `Unconnected -> Connecting -> Connected -> Closed`. A failed
//! `connect` or a `ConnectionLost` write returns the writer to `Unconnected`.

use crate::{Batch, WriteError};

/// Output connector capability
///
/// Methods take `&self` so a concurrent output can share one writer across
/// in-flight writes; implementations synchronize internally.
#[trait_variant::make(Writer: Send)]
pub trait LocalWriter {
    /// Writer name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Establish the downstream resource
    ///
    /// # Errors
    /// `Retryable` when the target is unavailable, `Fatal` when misconfigured
    async fn connect(&self) -> Result<(), WriteError>;

    /// Send one batch, preserving part order
    ///
    /// # Errors
    /// `Retryable`, `ConnectionLost` (reconnect first) or `Fatal`
    async fn write(&self, batch: &Batch) -> Result<(), WriteError>;

    /// Release the downstream resource
    async fn close(&self) -> Result<(), WriteError>;
}

/// Connection state tracked by writer wrappers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Never connected, or connection lost
    Unconnected,
    /// Connect in progress
    Connecting,
    /// Ready for writes
    Connected,
    /// Closed, no further writes
    Closed,
}
