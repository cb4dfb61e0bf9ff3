//! Graceful Shutdown Example
//!
//! Shows `close_async` and a bounded `wait_for_close` against a writer that is
//! slower than the shutdown deadline.
//!
//! Run with: cargo run --bin graceful_shutdown

use std::time::Duration;

use contracts::{Batch, Transaction, WriteError, Writer};
use output::OutputBuilder;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Writer that takes a fixed time per batch
struct SlowWriter {
    delay: Duration,
}

impl Writer for SlowWriter {
    fn name(&self) -> &str {
        "slow"
    }

    async fn connect(&self) -> Result<(), WriteError> {
        Ok(())
    }

    async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
        tokio::time::sleep(self.delay).await;
        info!(parts = batch.len(), "slow write finished");
        Ok(())
    }

    async fn close(&self) -> Result<(), WriteError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut output = OutputBuilder::new("slow")
        .max_in_flight(2)
        .spawn(SlowWriter {
            delay: Duration::from_millis(800),
        });

    let mut receivers = Vec::new();
    for i in 0..5 {
        let (transaction, rx) = Transaction::new(Batch::from_payloads([format!("msg-{i}")]));
        output.send(transaction).await;
        receivers.push(rx);
    }

    // Let the first two writes start, then stop admitting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    output.close_async();

    match output.wait_for_close(Duration::from_millis(200)).await {
        Ok(()) => info!("Output closed within the first deadline"),
        Err(e) => {
            warn!(error = %e, "Output still busy, waiting again");
            output.wait_for_close(Duration::from_secs(2)).await?;
        }
    }

    for (i, rx) in receivers.into_iter().enumerate() {
        match rx.wait().await {
            Ok(()) => info!(message = i, "acked"),
            Err(e) => info!(message = i, reason = %e, "nacked"),
        }
    }

    Ok(())
}
