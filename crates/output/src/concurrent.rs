//! Concurrent writer stage - up to N writes outstanding

use std::sync::Arc;

use contracts::{Transaction, Writer};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::delivery::{deliver, reject_queued};
use crate::metrics::OutputMetrics;

/// Spawn a worker that keeps at most `max_in_flight` writes outstanding
///
/// A permit is taken before a transaction is dequeued, so a saturated
/// writer leaves work in the bounded queue and pushes back on senders.
/// Each admitted transaction is written and acked on its own task; acks may
/// complete out of order. Shutdown waits for every permit to come back.
pub fn spawn_concurrent<W>(
    writer: W,
    max_in_flight: usize,
    rx: mpsc::Receiver<Transaction>,
    token: CancellationToken,
    metrics: Arc<OutputMetrics>,
) -> JoinHandle<()>
where
    W: Writer + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let name = writer.name().to_string();
        concurrent_worker(Arc::new(writer), max_in_flight.max(1), rx, token, metrics, name).await;
    })
}

#[instrument(
    name = "concurrent_output_loop",
    skip(writer, rx, token, metrics),
    fields(output = %name)
)]
async fn concurrent_worker<W>(
    writer: Arc<W>,
    max_in_flight: usize,
    mut rx: mpsc::Receiver<Transaction>,
    token: CancellationToken,
    metrics: Arc<OutputMetrics>,
    name: String,
) where
    W: Writer + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_in_flight));
    debug!(max_in_flight, "concurrent output started");

    loop {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let transaction = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = rx.recv() => match next {
                Some(transaction) => transaction,
                None => break,
            },
        };

        let writer = Arc::clone(&writer);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            deliver(writer.as_ref(), transaction, &metrics).await;
            drop(permit);
        });
    }

    reject_queued(&mut rx, &metrics);

    // Every slot back means every in-flight write has acked.
    let slots = u32::try_from(max_in_flight).unwrap_or(u32::MAX);
    if semaphore.acquire_many(slots).await.is_err() {
        error!("in-flight semaphore closed before drain");
    }
    if let Err(e) = writer.close().await {
        error!(error = %e, "close failed on shutdown");
    }
    debug!("concurrent output stopped");
}
