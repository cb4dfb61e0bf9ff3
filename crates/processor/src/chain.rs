//! Ordered processor chain

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{Batch, MessagePart, Processor};

/// Ordered list of stages applied to a whole batch
///
/// Every stage sees every part, failed ones included, so `catch` stages can
/// pick up failures left by earlier `try` blocks. Part count and order are
/// preserved unless a stage filters explicitly.
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<Arc<dyn Processor>>,
}

impl Chain {
    /// Create a chain from ordered stages
    pub fn new(stages: Vec<Arc<dyn Processor>>) -> Self {
        Self { stages }
    }

    /// Number of top-level stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[async_trait]
impl Processor for Chain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn process(&self, mut batch: Batch) -> Batch {
        for stage in &self.stages {
            if batch.is_empty() {
                break;
            }
            batch = stage.process(batch).await;
        }
        batch
    }
}

/// Run `stages` over each healthy part individually
///
/// A part that comes out of a stage failed skips every remaining stage and
/// keeps its position. Parts already failed on entry pass through untouched.
pub(crate) async fn apply_per_part(
    stages: &[Arc<dyn Processor>],
    parts: Vec<MessagePart>,
) -> Vec<MessagePart> {
    let mut current = parts;
    for stage in stages {
        if current.iter().all(MessagePart::is_failed) {
            break;
        }
        let mut next = Vec::with_capacity(current.len());
        for part in current {
            if part.is_failed() {
                next.push(part);
            } else {
                next.extend(stage.process(Batch::from(vec![part])).await);
            }
        }
        current = next;
    }
    current
}
