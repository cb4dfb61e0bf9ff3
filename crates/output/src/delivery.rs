//! Shared write-and-ack step used by every writer stage

use contracts::{DeliveryError, Transaction, Writer};
use observability::record_write;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::OutputMetrics;

/// Nack transactions that still carry failed parts; pass the rest through
pub(crate) fn admit(transaction: Transaction, metrics: &OutputMetrics) -> Option<Transaction> {
    let failed = transaction.batch().failed_count();
    if failed == 0 {
        return Some(transaction);
    }
    let first = transaction
        .batch()
        .first_failure()
        .map(ToString::to_string)
        .unwrap_or_default();
    warn!(failed, first = %first, "batch holds failed parts, rejecting without write");
    nack(transaction, DeliveryError::FailedParts { failed, first }, metrics);
    None
}

/// Resolve a transaction with a failure
pub(crate) fn nack(transaction: Transaction, reason: DeliveryError, metrics: &OutputMetrics) {
    metrics.inc_nack_count();
    transaction.ack(Err(reason));
}

/// Write one transaction and deliver its ack
pub(crate) async fn deliver<W: Writer + Sync>(
    writer: &W,
    transaction: Transaction,
    metrics: &OutputMetrics,
) {
    let Some(transaction) = admit(transaction, metrics) else {
        return;
    };
    let (batch, ack) = transaction.into_parts();

    let started = Instant::now();
    let result = {
        let _in_flight = metrics.begin_write();
        writer.write(&batch).await
    };
    record_write(writer.name(), result.is_ok(), started.elapsed());

    let result = match result {
        Ok(()) => {
            metrics.inc_write_count();
            debug!(parts = batch.len(), "batch written");
            Ok(())
        }
        Err(e) => {
            metrics.inc_failure_count();
            metrics.inc_nack_count();
            Err(DeliveryError::Write(e))
        }
    };
    ack.ack(result);
}

/// Stop admitting and nack everything still queued
pub(crate) fn reject_queued(rx: &mut mpsc::Receiver<Transaction>, metrics: &OutputMetrics) {
    rx.close();
    let mut rejected = 0usize;
    while let Ok(transaction) = rx.try_recv() {
        nack(transaction, DeliveryError::ShutdownInProgress, metrics);
        rejected += 1;
    }
    if rejected > 0 {
        debug!(rejected, "queued transactions rejected on shutdown");
    }
}
