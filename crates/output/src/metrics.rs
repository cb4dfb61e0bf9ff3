//! Output metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a single output
#[derive(Debug, Default)]
pub struct OutputMetrics {
    /// Writes that succeeded (after retries)
    write_count: AtomicU64,
    /// Writes that failed after retries
    failure_count: AtomicU64,
    /// Individual retry attempts
    retry_count: AtomicU64,
    /// Transactions resolved with a failure
    nack_count: AtomicU64,
    /// Batches produced by the batch policy
    batch_count: AtomicU64,
    /// Writes currently outstanding
    in_flight: AtomicUsize,
    /// Highest observed number of outstanding writes
    peak_in_flight: AtomicUsize,
}

impl OutputMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_retry_count(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nack_count(&self) -> u64 {
        self.nack_count.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_nack_count(&self) {
        self.nack_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_batch_count(&self) {
        self.batch_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Mark a write as outstanding until the guard drops
    pub(crate) fn begin_write(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlightGuard { metrics: self }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            retry_count: self.retry_count(),
            nack_count: self.nack_count(),
            batch_count: self.batch_count(),
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
        }
    }
}

pub(crate) struct InFlightGuard<'a> {
    metrics: &'a OutputMetrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Snapshot of output metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub write_count: u64,
    pub failure_count: u64,
    pub retry_count: u64,
    pub nack_count: u64,
    pub batch_count: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}
