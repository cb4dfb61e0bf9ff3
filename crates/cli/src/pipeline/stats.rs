//! Stream statistics.

use std::time::Duration;

use observability::DeliverySummary;

/// Statistics from a stream run
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Whether the run was stopped by a signal or timeout
    pub interrupted: bool,

    /// Whether some stage was still busy when the shutdown deadline passed
    pub incomplete_shutdown: bool,

    /// Input counters
    pub ingestion: ingestion::MetricsSnapshot,

    /// Ack outcomes seen by the input
    pub delivery: DeliverySummary,

    /// Transactions that went through the processor chain
    pub processed: u64,

    /// Transactions filtered to an empty batch
    pub filtered: u64,

    /// Output counters
    pub output: output::MetricsSnapshot,
}

impl StreamStats {
    /// Batches acknowledged per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.delivery.acked as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Stream Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Interrupted: {}", self.interrupted);
        println!("   ├─ Incomplete shutdown: {}", self.incomplete_shutdown);
        println!("   ├─ Batches read: {}", self.ingestion.batches_read);
        println!("   ├─ Processed: {}", self.processed);
        println!("   ├─ Filtered: {}", self.filtered);
        println!("   └─ Throughput: {:.2} batches/s", self.throughput());

        println!("\nInput");
        println!("   ├─ Deliveries: {}", self.ingestion.deliveries);
        println!("   ├─ Redelivered: {}", self.ingestion.redelivered);
        println!("   ├─ Abandoned: {}", self.ingestion.abandoned);
        println!("   └─ Interrupted: {}", self.ingestion.interrupted);

        println!("\nOutput");
        println!("   ├─ Writes: {}", self.output.write_count);
        println!("   ├─ Failures: {}", self.output.failure_count);
        println!("   ├─ Retries: {}", self.output.retry_count);
        println!("   ├─ Nacks: {}", self.output.nack_count);
        println!("   ├─ Batches flushed: {}", self.output.batch_count);
        println!("   └─ Peak in flight: {}", self.output.peak_in_flight);

        println!("\n{}", self.delivery);
    }
}
