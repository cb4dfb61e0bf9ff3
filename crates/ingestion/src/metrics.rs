//! Ingestion metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Batches read from the source
    pub batches_read: AtomicU64,

    /// Deliveries sent downstream (first attempts and redeliveries)
    pub deliveries: AtomicU64,

    /// Batches acknowledged successfully
    pub acked: AtomicU64,

    /// Negative acknowledgments received
    pub nacked: AtomicU64,

    /// Redeliveries performed
    pub redelivered: AtomicU64,

    /// Batches given up after the redelivery budget
    pub abandoned: AtomicU64,

    /// Batches stopped by shutdown or a closed channel
    pub interrupted: AtomicU64,

    /// Batches read but not yet resolved
    pub pending: AtomicUsize,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_read: self.batches_read.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches_read: u64,
    pub deliveries: u64,
    pub acked: u64,
    pub nacked: u64,
    pub redelivered: u64,
    pub abandoned: u64,
    pub interrupted: u64,
    pub pending: usize,
}
