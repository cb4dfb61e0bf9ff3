//! OutputHandle - owns a running output and its shutdown

use std::sync::Arc;
use std::time::Duration;

use contracts::{DeliveryError, Transaction};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::OutputError;
use crate::metrics::OutputMetrics;

/// Handle to a running output worker
pub struct OutputHandle {
    /// Output name
    name: String,
    /// Channel to send transactions to the worker (None once closing)
    tx: Option<mpsc::Sender<Transaction>>,
    /// Stops admission when cancelled
    token: CancellationToken,
    /// Flushes partial batches once cancelled (child of `token`)
    drain: CancellationToken,
    /// Worker task (None once joined)
    worker: Option<JoinHandle<()>>,
    /// Shared metrics
    metrics: Arc<OutputMetrics>,
}

impl OutputHandle {
    pub(crate) fn new(
        name: String,
        tx: mpsc::Sender<Transaction>,
        token: CancellationToken,
        drain: CancellationToken,
        worker: JoinHandle<()>,
        metrics: Arc<OutputMetrics>,
    ) -> Self {
        Self {
            name,
            tx: Some(tx),
            token,
            drain,
            worker: Some(worker),
            metrics,
        }
    }

    /// Get output name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get shared metrics
    pub fn metrics(&self) -> &Arc<OutputMetrics> {
        &self.metrics
    }

    /// Sender for upstream stages; `None` once closing
    pub fn sender(&self) -> Option<mpsc::Sender<Transaction>> {
        self.tx.clone()
    }

    /// Hand a transaction to the output
    ///
    /// Waits only while the queue is full. A closing output nacks the
    /// transaction with `ShutdownInProgress` and returns `false`.
    pub async fn send(&self, transaction: Transaction) -> bool {
        let Some(tx) = &self.tx else {
            transaction.ack(Err(DeliveryError::ShutdownInProgress));
            return false;
        };
        match tx.send(transaction).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(transaction)) => {
                warn!(output = %self.name, "output worker gone, rejecting transaction");
                transaction.ack(Err(DeliveryError::ShutdownInProgress));
                false
            }
        }
    }

    /// Upstream has nothing new to send
    ///
    /// Admission stays open, for redeliveries, but a batched output stops
    /// waiting for size triggers and flushes whenever its queue is idle.
    pub fn drain(&self) {
        if !self.drain.is_cancelled() {
            debug!(output = %self.name, "output draining");
        }
        self.drain.cancel();
    }

    /// Token behind [`OutputHandle::drain`], for wiring to an upstream signal
    pub fn drain_token(&self) -> CancellationToken {
        self.drain.clone()
    }

    /// Whether shutdown has been requested
    pub fn is_closing(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request shutdown without waiting
    ///
    /// No new transactions are admitted; queued ones are nacked, buffered
    /// ones are flushed and in-flight writes finish on their own.
    pub fn close_async(&mut self) {
        if !self.token.is_cancelled() {
            info!(output = %self.name, "output closing");
        }
        self.tx = None;
        self.token.cancel();
    }

    /// Wait up to `timeout` for the worker to finish
    ///
    /// # Errors
    /// `OutputError::Timeout` if work is still in flight at the deadline. The
    /// handle stays valid so the caller may wait again.
    #[instrument(name = "output_wait_for_close", skip(self), fields(output = %self.name))]
    pub async fn wait_for_close(&mut self, timeout: Duration) -> Result<(), OutputError> {
        let Some(worker) = self.worker.as_mut() else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, worker).await {
            Ok(joined) => {
                self.worker = None;
                if let Err(e) = joined {
                    error!(error = ?e, "output worker panicked");
                }
                debug!("output closed");
                Ok(())
            }
            Err(_) => Err(OutputError::Timeout {
                name: self.name.clone(),
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Graceful shutdown: stop accepting, let the queue drain, wait
    ///
    /// Unlike `close_async`, queued transactions are still written. The
    /// worker finishes once every cloned sender has been dropped.
    #[instrument(name = "output_shutdown", skip(self), fields(output = %self.name))]
    pub async fn shutdown(mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!(error = ?e, "output worker panicked");
            }
        }
        debug!("output shutdown complete");
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.token.cancel();
        }
    }
}
