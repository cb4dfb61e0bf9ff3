//! Ingestion Pipeline main entry

use std::sync::{Arc, Mutex, PoisonError};

use async_channel::{bounded, Receiver, Sender};
use contracts::{Batch, DeliveryError, InputConfig, Transaction};
use observability::{record_redelivery, record_transaction, DeliveryAggregator, DeliverySummary};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::metrics::{IngestionMetrics, MetricsSnapshot};
use crate::source::BatchSource;

/// Ingestion Pipeline
///
/// Reads batches from a [`BatchSource`], wraps each delivery in a fresh
/// [`Transaction`] and redelivers nacked batches until they are acked or the
/// redelivery budget runs out. At most `max_pending` batches are unresolved
/// at any time.
pub struct IngestionPipeline {
    config: InputConfig,

    /// Transaction sender (shared by delivery tasks)
    tx: Sender<Transaction>,

    /// Transaction receiver
    rx: Option<Receiver<Transaction>>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Ack outcome aggregation
    aggregator: Arc<Mutex<DeliveryAggregator>>,

    token: CancellationToken,

    /// Cancelled once no new batch will be read
    exhausted: CancellationToken,
}

/// Result of a completed ingestion run
#[derive(Debug, Clone)]
pub struct IngestionReport {
    /// Source name
    pub source: String,
    /// Counters at the end of the run
    pub metrics: MetricsSnapshot,
    /// Ack outcomes of every delivery
    pub summary: DeliverySummary,
}

/// How a single batch left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Acked,
    Abandoned,
    Interrupted,
}

#[derive(Clone)]
struct DeliveryContext {
    tx: Sender<Transaction>,
    metrics: Arc<IngestionMetrics>,
    aggregator: Arc<Mutex<DeliveryAggregator>>,
    token: CancellationToken,
    max_redeliveries: u32,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    pub fn new(config: InputConfig) -> Self {
        let (tx, rx) = bounded(config.queue_capacity.max(1));

        Self {
            config,
            tx,
            rx: Some(rx),
            metrics: Arc::new(IngestionMetrics::new()),
            aggregator: Arc::new(Mutex::new(DeliveryAggregator::new())),
            token: CancellationToken::new(),
            exhausted: CancellationToken::new(),
        }
    }

    /// Take receiver (can only be called once)
    pub fn take_receiver(&mut self) -> Option<Receiver<Transaction>> {
        self.rx.take()
    }

    /// Get shared metrics
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Token that stops reading and redelivery when cancelled
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token cancelled when reading stops, before outstanding acks settle
    ///
    /// Only redeliveries follow it on the transaction channel.
    pub fn exhausted(&self) -> CancellationToken {
        self.exhausted.clone()
    }

    /// Current ack summary
    pub fn summary(&self) -> DeliverySummary {
        lock(&self.aggregator).summary()
    }

    /// Drive the source to exhaustion (or cancellation)
    ///
    /// Returns once every batch read has been acked, abandoned or
    /// interrupted. The transaction channel is closed on return.
    #[instrument(name = "ingestion_run", skip_all, fields(source = %source.name()))]
    pub async fn run<S: BatchSource>(mut self, mut source: S) -> Result<IngestionReport> {
        // Nobody would ever receive from a receiver still held here.
        drop(self.rx.take());

        let permits = Arc::new(Semaphore::new(self.config.max_pending.max(1)));
        let ctx = DeliveryContext {
            tx: self.tx.clone(),
            metrics: Arc::clone(&self.metrics),
            aggregator: Arc::clone(&self.aggregator),
            token: self.token.clone(),
            max_redeliveries: self.config.max_redeliveries,
        };
        let mut deliveries = JoinSet::new();
        let mut read_error = None;

        info!(
            max_pending = self.config.max_pending,
            max_redeliveries = self.config.max_redeliveries,
            "Ingestion started"
        );

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let batch = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                batch = source.next_batch() => batch,
            };

            let batch = match batch {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    debug!("Source exhausted");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Source read failed");
                    read_error = Some(e);
                    break;
                }
            };

            IngestionMetrics::inc(&self.metrics.batches_read);
            self.metrics.pending.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            let ctx = ctx.clone();
            deliveries.spawn(async move {
                let outcome = deliver(batch, &ctx).await;
                ctx.metrics.pending.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                drop(permit);
                outcome
            });

            while let Some(finished) = deliveries.try_join_next() {
                log_join_error(finished);
            }
        }

        self.exhausted.cancel();

        while let Some(finished) = deliveries.join_next().await {
            log_join_error(finished);
        }

        drop(ctx);
        self.tx.close();

        let report = IngestionReport {
            source: source.name().to_string(),
            metrics: self.metrics.snapshot(),
            summary: lock(&self.aggregator).summary(),
        };

        info!(
            batches = report.metrics.batches_read,
            acked = report.metrics.acked,
            abandoned = report.metrics.abandoned,
            redelivered = report.metrics.redelivered,
            "Ingestion finished"
        );

        match read_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Deliver one batch until it is acked or redelivery stops
async fn deliver(batch: Batch, ctx: &DeliveryContext) -> Outcome {
    let mut redeliveries = 0u32;

    loop {
        let (transaction, ack) = Transaction::new(batch.clone());
        let started = Instant::now();

        if ctx.tx.send(transaction).await.is_err() {
            // The returned transaction is dropped here and resolves its own receiver.
            debug!(error = %IngestionError::ChannelClosed, "Delivery interrupted");
            IngestionMetrics::inc(&ctx.metrics.interrupted);
            return Outcome::Interrupted;
        }
        IngestionMetrics::inc(&ctx.metrics.deliveries);

        let result = ack.wait().await;
        record_transaction(&result);
        lock(&ctx.aggregator).update(&result, started.elapsed());

        let reason = match result {
            Ok(()) => {
                IngestionMetrics::inc(&ctx.metrics.acked);
                return Outcome::Acked;
            }
            Err(reason) => reason,
        };
        IngestionMetrics::inc(&ctx.metrics.nacked);

        if ctx.token.is_cancelled() || reason == DeliveryError::ShutdownInProgress {
            debug!(error = %reason, "Batch nacked during shutdown, not redelivering");
            IngestionMetrics::inc(&ctx.metrics.interrupted);
            return Outcome::Interrupted;
        }

        if ctx.max_redeliveries > 0 && redeliveries >= ctx.max_redeliveries {
            warn!(
                error = %reason,
                redeliveries,
                parts = batch.len(),
                "Batch abandoned after exhausting redeliveries"
            );
            IngestionMetrics::inc(&ctx.metrics.abandoned);
            return Outcome::Abandoned;
        }

        redeliveries += 1;
        debug!(error = %reason, attempt = redeliveries, "Redelivering nacked batch");
        IngestionMetrics::inc(&ctx.metrics.redelivered);
        record_redelivery(redeliveries);
        lock(&ctx.aggregator).record_redelivery();
    }
}

fn log_join_error(finished: std::result::Result<Outcome, tokio::task::JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Delivery task failed");
    }
}

fn lock(aggregator: &Mutex<DeliveryAggregator>) -> std::sync::MutexGuard<'_, DeliveryAggregator> {
    aggregator.lock().unwrap_or_else(PoisonError::into_inner)
}
