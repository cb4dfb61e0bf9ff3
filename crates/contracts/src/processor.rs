//! Processor trait - a stage of the processor chain

use async_trait::async_trait;

use crate::Batch;

/// Transformation stage `Batch -> Batch`
///
/// Failures are recorded on the offending parts (`MessagePart::with_error`)
/// instead of aborting the batch, so sibling parts keep flowing.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processor name (used for logging/metrics and error annotations)
    fn name(&self) -> &str;

    /// Apply the stage; the returned batch replaces the input
    async fn process(&self, batch: Batch) -> Batch;
}
