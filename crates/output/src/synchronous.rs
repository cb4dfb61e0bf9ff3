//! Synchronous writer stage - one write outstanding at a time

use std::sync::Arc;

use contracts::{Transaction, Writer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::delivery::{deliver, reject_queued};
use crate::metrics::OutputMetrics;

/// Spawn a worker that writes transactions strictly one after another
///
/// The next transaction is not dequeued until the previous one's ack has
/// fired. Cancelling `token` stops admission; queued transactions are
/// nacked with `ShutdownInProgress` and the writer is closed.
pub fn spawn_sync<W>(
    writer: W,
    rx: mpsc::Receiver<Transaction>,
    token: CancellationToken,
    metrics: Arc<OutputMetrics>,
) -> JoinHandle<()>
where
    W: Writer + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let name = writer.name().to_string();
        sync_worker(writer, rx, token, metrics, name).await;
    })
}

#[instrument(name = "sync_output_loop", skip(writer, rx, token, metrics), fields(output = %name))]
async fn sync_worker<W: Writer + Sync>(
    writer: W,
    mut rx: mpsc::Receiver<Transaction>,
    token: CancellationToken,
    metrics: Arc<OutputMetrics>,
    name: String,
) {
    debug!("sync output started");

    loop {
        let transaction = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = rx.recv() => match next {
                Some(transaction) => transaction,
                None => break,
            },
        };
        deliver(&writer, transaction, &metrics).await;
    }

    reject_queued(&mut rx, &metrics);
    if let Err(e) = writer.close().await {
        error!(error = %e, "close failed on shutdown");
    }
    debug!("sync output stopped");
}
