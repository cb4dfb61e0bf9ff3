//! Transaction - a batch paired with a single-use acknowledgment
//!
//! Whoever holds the `Transaction` owns the Ack obligation. `AckHandle::ack`
//! consumes the handle, so double-acking cannot compile; dropping a handle
//! without acking resolves the originator with `DeliveryError::AckDropped`.

use tokio::sync::oneshot;
use tracing::warn;

use crate::{Batch, DeliveryError};

/// Outcome delivered back to the originator of a transaction
pub type AckResult = Result<(), DeliveryError>;

/// A batch in flight plus its acknowledgment obligation
#[derive(Debug)]
pub struct Transaction {
    batch: Batch,
    ack: AckHandle,
}

impl Transaction {
    /// Create a transaction and the receiver its originator awaits
    pub fn new(batch: Batch) -> (Self, AckReceiver) {
        let (tx, rx) = oneshot::channel();
        let transaction = Self {
            batch,
            ack: AckHandle {
                target: AckTarget::Single(Some(tx)),
            },
        };
        (transaction, AckReceiver { rx })
    }

    /// Reassemble a transaction after a stage produced a new batch
    pub fn from_parts(batch: Batch, ack: AckHandle) -> Self {
        Self { batch, ack }
    }

    /// Borrow the batch
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Number of originating transactions this one acknowledges
    pub fn contributors(&self) -> usize {
        self.ack.contributors()
    }

    /// Split into batch and ack obligation (ownership transfer)
    pub fn into_parts(self) -> (Batch, AckHandle) {
        (self.batch, self.ack)
    }

    /// Resolve the transaction, dropping its batch
    pub fn ack(self, result: AckResult) {
        self.ack.ack(result);
    }
}

/// Write-once side of the acknowledgment channel
#[must_use = "an AckHandle must be acked, dropping it nacks the origin"]
#[derive(Debug)]
pub struct AckHandle {
    target: AckTarget,
}

#[derive(Debug)]
enum AckTarget {
    Single(Option<oneshot::Sender<AckResult>>),
    Merged(Vec<AckHandle>),
}

impl AckHandle {
    /// Combine several handles; acking the result resolves every contributor
    pub fn merge(handles: Vec<AckHandle>) -> Self {
        Self {
            target: AckTarget::Merged(handles),
        }
    }

    /// Number of originating transactions behind this handle
    pub fn contributors(&self) -> usize {
        match &self.target {
            AckTarget::Single(_) => 1,
            AckTarget::Merged(handles) => handles.iter().map(AckHandle::contributors).sum(),
        }
    }

    /// Deliver the result; consumes the handle
    pub fn ack(mut self, result: AckResult) {
        self.resolve(result);
    }

    fn resolve(&mut self, result: AckResult) {
        match &mut self.target {
            AckTarget::Single(tx) => {
                if let Some(tx) = tx.take() {
                    // Originator may have stopped listening; nothing left to notify.
                    let _ = tx.send(result);
                }
            }
            AckTarget::Merged(handles) => {
                for handle in std::mem::take(handles) {
                    handle.ack(result.clone());
                }
            }
        }
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        if let AckTarget::Single(Some(_)) = &self.target {
            warn!("transaction dropped without acknowledgement");
            self.resolve(Err(DeliveryError::AckDropped));
        }
    }
}

/// Read-once side of the acknowledgment channel
#[derive(Debug)]
pub struct AckReceiver {
    rx: oneshot::Receiver<AckResult>,
}

impl AckReceiver {
    /// Wait for the transaction outcome
    pub async fn wait(self) -> AckResult {
        self.rx.await.unwrap_or(Err(DeliveryError::AckDropped))
    }

    /// Non-blocking check; `None` while the transaction is still in flight
    pub fn try_result(&mut self) -> Option<AckResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DeliveryError::AckDropped)),
        }
    }
}
