//! Try / Catch branching stages

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{Batch, Processor};
use tracing::debug;

use crate::chain::apply_per_part;

/// Applies child stages to each healthy part
///
/// The moment a child fails a part, that part skips the remaining children
/// while its siblings carry on. Parts already failed on entry are untouched.
pub struct TryProcessor {
    children: Vec<Arc<dyn Processor>>,
}

impl TryProcessor {
    pub fn new(children: Vec<Arc<dyn Processor>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Processor for TryProcessor {
    fn name(&self) -> &str {
        "try"
    }

    async fn process(&self, batch: Batch) -> Batch {
        apply_per_part(&self.children, batch.into_parts())
            .await
            .into()
    }
}

/// Applies child stages only to failed parts
///
/// Entering the block clears the failure annotation, so a part that fails
/// again inside the block carries the new annotation on to the next `catch`.
/// Healthy parts pass through untouched.
pub struct CatchProcessor {
    children: Vec<Arc<dyn Processor>>,
}

impl CatchProcessor {
    pub fn new(children: Vec<Arc<dyn Processor>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Processor for CatchProcessor {
    fn name(&self) -> &str {
        "catch"
    }

    async fn process(&self, batch: Batch) -> Batch {
        let failed = batch.failed_count();
        if failed == 0 {
            return batch;
        }
        debug!(failed, "catch block handling failed parts");

        let mut out = Batch::new();
        for part in batch {
            if part.is_failed() {
                let recovered = apply_per_part(&self.children, vec![part.clear_error()]).await;
                out.extend(recovered);
            } else {
                out.push(part);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::{payloads, Probe};
    use crate::Chain;

    #[tokio::test]
    async fn test_try_then_catch_routes_failed_part() {
        let s1 = Probe::failing("s1", "p");
        let s2 = Probe::new("s2");
        let s3 = Probe::new("s3");
        let chain = Chain::new(vec![
            Arc::new(TryProcessor::new(vec![s1.clone(), s2.clone()])),
            Arc::new(CatchProcessor::new(vec![s3.clone()])),
        ]);

        let out = chain.process(Batch::from_payloads(["q", "p", "r"])).await;

        assert_eq!(s1.seen(), vec!["q", "p", "r"]);
        assert_eq!(s2.seen(), vec!["q", "r"]);
        assert_eq!(s3.seen(), vec!["p"]);
        assert_eq!(payloads(&out), vec!["q", "p", "r"]);
        assert_eq!(out.failed_count(), 0);
    }

    #[tokio::test]
    async fn test_catch_refailure_keeps_annotation_for_next_catch() {
        let s1 = Probe::failing("s1", "p");
        let retry = Probe::failing("retry", "p");
        let last = Probe::new("last");
        let chain = Chain::new(vec![
            Arc::new(TryProcessor::new(vec![s1])),
            Arc::new(CatchProcessor::new(vec![retry.clone()])),
            Arc::new(CatchProcessor::new(vec![last.clone()])),
        ]);

        let out = chain.process(Batch::from_payloads(["p", "ok"])).await;

        assert_eq!(retry.seen(), vec!["p"]);
        assert_eq!(last.seen(), vec!["p"]);
        assert_eq!(out.failed_count(), 0);
    }

    #[tokio::test]
    async fn test_part_failed_before_try_skips_children() {
        let before = Probe::failing("before", "a");
        let inner = Probe::new("inner");
        let chain = Chain::new(vec![
            before,
            Arc::new(TryProcessor::new(vec![inner.clone()])),
        ]);

        let out = chain.process(Batch::from_payloads(["a", "b"])).await;

        assert_eq!(inner.seen(), vec!["b"]);
        assert_eq!(out.first_failure().unwrap().kind, "before");
    }

    #[tokio::test]
    async fn test_catch_without_failures_is_passthrough() {
        let handler = Probe::new("handler");
        let catch = CatchProcessor::new(vec![handler.clone()]);

        let out = catch.process(Batch::from_payloads(["x"])).await;

        assert!(handler.seen().is_empty());
        assert_eq!(payloads(&out), vec!["x"]);
    }
}
