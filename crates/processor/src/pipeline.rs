//! ProcessorPipeline - worker pool between input and output
//!
//! `threads` workers share one MPMC queue of transactions. Each worker owns
//! a transaction from the moment it is received until it is forwarded or
//! acknowledged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use contracts::{DeliveryError, Processor, Transaction};
use observability::record_parts_processed;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::chain::Chain;

/// Counters shared by all pipeline workers
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Transactions taken from the input queue
    received: AtomicU64,
    /// Transactions handed to the output
    forwarded: AtomicU64,
    /// Transactions acked because processing left no parts
    filtered: AtomicU64,
    /// Transactions nacked because the output was gone
    rejected: AtomicU64,
}

impl PipelineMetrics {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Handle to the running worker pool
pub struct ProcessorPipeline {
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<PipelineMetrics>,
}

impl ProcessorPipeline {
    /// Spawn `threads` workers pulling from `input` and pushing to `output`
    ///
    /// Workers exit once `input` is closed and drained.
    pub fn spawn(
        chain: Chain,
        threads: usize,
        input: Receiver<Transaction>,
        output: mpsc::Sender<Transaction>,
    ) -> Self {
        let chain = Arc::new(chain);
        let metrics = Arc::new(PipelineMetrics::default());
        let threads = threads.max(1);

        let workers = (0..threads)
            .map(|worker_id| {
                let chain = Arc::clone(&chain);
                let input = input.clone();
                let output = output.clone();
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    pipeline_worker(worker_id, chain, input, output, metrics).await;
                })
            })
            .collect();

        info!(threads, stages = chain.len(), "processor pipeline started");
        Self { workers, metrics }
    }

    /// Shared counters
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Wait for every worker to finish
    pub async fn join(mut self) {
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!(error = %e, "pipeline worker panicked");
            }
        }
        self.log_stopped();
    }

    /// Wait up to `timeout` for the workers, aborting any still running
    ///
    /// Returns `false` if a worker had to be aborted. Transactions held by an
    /// aborted worker resolve through their dropped ack handles.
    pub async fn join_within(mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut finished = true;
        for mut worker in self.workers.drain(..) {
            match tokio::time::timeout_at(deadline, &mut worker).await {
                Ok(Err(e)) => warn!(error = %e, "pipeline worker panicked"),
                Ok(Ok(())) => {}
                Err(_) => {
                    worker.abort();
                    finished = false;
                }
            }
        }
        if !finished {
            warn!("processor workers still busy at the deadline, aborted");
        }
        self.log_stopped();
        finished
    }

    fn log_stopped(&self) {
        info!(
            received = self.metrics.received(),
            forwarded = self.metrics.forwarded(),
            filtered = self.metrics.filtered(),
            "processor pipeline stopped"
        );
    }
}

#[instrument(name = "pipeline_worker", skip(chain, input, output, metrics))]
async fn pipeline_worker(
    worker_id: usize,
    chain: Arc<Chain>,
    input: Receiver<Transaction>,
    output: mpsc::Sender<Transaction>,
    metrics: Arc<PipelineMetrics>,
) {
    while let Ok(transaction) = input.recv().await {
        metrics.received.fetch_add(1, Ordering::Relaxed);

        let (batch, ack) = transaction.into_parts();
        let batch = chain.process(batch).await;
        record_parts_processed(batch.len());

        if batch.is_empty() {
            debug!("batch filtered to nothing, acknowledging");
            metrics.filtered.fetch_add(1, Ordering::Relaxed);
            ack.ack(Ok(()));
            continue;
        }

        if let Err(mpsc::error::SendError(rejected)) =
            output.send(Transaction::from_parts(batch, ack)).await
        {
            warn!("output closed, rejecting transaction");
            metrics.rejected.fetch_add(1, Ordering::Relaxed);
            rejected.ack(Err(DeliveryError::ShutdownInProgress));
            continue;
        }
        metrics.forwarded.fetch_add(1, Ordering::Relaxed);
    }
    debug!("input closed, worker exiting");
}
