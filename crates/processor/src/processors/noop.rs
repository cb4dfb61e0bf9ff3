use async_trait::async_trait;
use contracts::{Batch, Processor};

/// Passes batches through unchanged
#[derive(Debug, Default)]
pub struct NoopProcessor;

#[async_trait]
impl Processor for NoopProcessor {
    fn name(&self) -> &str {
        "noop"
    }

    async fn process(&self, batch: Batch) -> Batch {
        batch
    }
}
