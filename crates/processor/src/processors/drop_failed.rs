//! Explicit filter for failed parts

use async_trait::async_trait;
use contracts::{Batch, Processor};
use tracing::debug;

/// Removes every part that carries a failure annotation
///
/// The only built-in stage that shrinks a batch. A batch emptied by it is
/// acknowledged successfully by the pipeline.
#[derive(Debug, Default)]
pub struct DropFailedProcessor;

#[async_trait]
impl Processor for DropFailedProcessor {
    fn name(&self) -> &str {
        "drop_failed"
    }

    async fn process(&self, batch: Batch) -> Batch {
        let before = batch.len();
        let kept: Batch = batch.into_iter().filter(|p| !p.is_failed()).collect();
        if kept.len() < before {
            debug!(dropped = before - kept.len(), "dropped failed parts");
        }
        kept
    }
}
