//! Batcher - applies a BatchPolicy in front of a writer stage

use std::sync::Arc;

use contracts::{DeliveryError, Transaction};
use observability::record_batch_flushed;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::delivery::{admit, nack, reject_queued};
use crate::metrics::OutputMetrics;
use crate::policy::BatchPolicy;

/// Spawn a batcher feeding `child_tx`; `child` is the writer stage behind it
///
/// On cancellation or when the input closes, whatever is buffered is flushed
/// as a final batch, the child's queue is closed and the child is awaited.
/// Once `drain` is cancelled the upstream has nothing new to send, so a
/// partial batch is flushed as soon as the input queue is idle.
pub fn spawn_batcher(
    policy: BatchPolicy,
    rx: mpsc::Receiver<Transaction>,
    child_tx: mpsc::Sender<Transaction>,
    child: JoinHandle<()>,
    token: CancellationToken,
    drain: CancellationToken,
    metrics: Arc<OutputMetrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        batcher_worker(policy, rx, child_tx, token, drain, &metrics).await;
        if let Err(e) = child.await {
            error!(error = ?e, "writer stage panicked");
        }
    })
}

#[instrument(name = "batcher_loop", skip_all)]
async fn batcher_worker(
    mut policy: BatchPolicy,
    mut rx: mpsc::Receiver<Transaction>,
    child_tx: mpsc::Sender<Transaction>,
    token: CancellationToken,
    drain: CancellationToken,
    metrics: &OutputMetrics,
) {
    debug!("batcher started");

    loop {
        let deadline = policy.deadline();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                flush(&mut policy, &child_tx, metrics).await;
            }
            next = rx.recv() => match next {
                Some(transaction) => {
                    let Some(transaction) = admit(transaction, metrics) else {
                        continue;
                    };
                    if policy.add(transaction) {
                        flush(&mut policy, &child_tx, metrics).await;
                    }
                }
                None => break,
            },
            // Only reached while the input queue is empty.
            _ = drain.cancelled(), if !policy.is_empty() => {
                debug!(pending = policy.len(), "upstream drained, flushing partial batch");
                flush(&mut policy, &child_tx, metrics).await;
            }
        }
    }

    if token.is_cancelled() {
        reject_queued(&mut rx, metrics);
    }
    if !policy.is_empty() {
        debug!(pending = policy.len(), "forcing final flush");
        flush(&mut policy, &child_tx, metrics).await;
    }
    debug!("batcher stopped");
}

async fn flush(policy: &mut BatchPolicy, child_tx: &mpsc::Sender<Transaction>, metrics: &OutputMetrics) {
    let Some(transaction) = policy.flush() else {
        return;
    };
    metrics.inc_batch_count();
    record_batch_flushed(
        transaction.batch().len(),
        transaction.batch().byte_size(),
        transaction.contributors(),
    );
    if let Err(mpsc::error::SendError(transaction)) = child_tx.send(transaction).await {
        error!("writer stage gone, rejecting flushed batch");
        nack(transaction, DeliveryError::ShutdownInProgress, metrics);
    }
}
