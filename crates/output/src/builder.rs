//! OutputBuilder - assembles `[Batcher] -> Sync | Concurrent -> Retry -> Writer`

use std::sync::Arc;

use contracts::{BatchPolicyConfig, OutputConfig, RetryConfig, Writer, WriterType};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::batcher::spawn_batcher;
use crate::concurrent::spawn_concurrent;
use crate::error::OutputError;
use crate::handle::OutputHandle;
use crate::metrics::OutputMetrics;
use crate::policy::BatchPolicy;
use crate::retry::Retry;
use crate::sinks::{FileWriter, LogWriter};
use crate::synchronous::spawn_sync;

/// Builder for an output around any `Writer`
#[derive(Debug, Clone)]
pub struct OutputBuilder {
    name: String,
    max_in_flight: usize,
    queue_capacity: usize,
    batching: BatchPolicyConfig,
    retry: RetryConfig,
}

impl OutputBuilder {
    /// Synchronous, unbatched output with default retries
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(&OutputConfig {
            name: name.into(),
            ..Default::default()
        })
    }

    /// Take every knob from configuration
    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            name: config.name.clone(),
            max_in_flight: config.max_in_flight,
            queue_capacity: config.queue_capacity,
            batching: config.batching,
            retry: config.retry,
        }
    }

    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn batching(mut self, batching: BatchPolicyConfig) -> Self {
        self.batching = batching;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Wrap `writer` and start the worker stages
    ///
    /// Must be called within a tokio runtime.
    #[instrument(
        name = "output_builder_spawn",
        skip(self, writer),
        fields(output = %self.name, max_in_flight = self.max_in_flight)
    )]
    pub fn spawn<W>(self, writer: W) -> OutputHandle
    where
        W: Writer + Send + Sync + 'static,
    {
        let metrics = Arc::new(OutputMetrics::new());
        let writer = Retry::new(writer, self.retry, Arc::clone(&metrics));
        let token = CancellationToken::new();
        let drain = token.child_token();
        let (tx, rx) = mpsc::channel(self.queue_capacity.max(1));

        let policy = BatchPolicy::new(self.batching);
        let worker = if policy.is_noop() {
            spawn_writer_stage(writer, self.max_in_flight, rx, token.clone(), &metrics)
        } else {
            // The writer stage stops when the batcher drops its sender, after the final flush.
            let (child_tx, child_rx) = mpsc::channel(self.max_in_flight.max(1));
            let child = spawn_writer_stage(
                writer,
                self.max_in_flight,
                child_rx,
                CancellationToken::new(),
                &metrics,
            );
            spawn_batcher(
                policy,
                rx,
                child_tx,
                child,
                token.clone(),
                drain.clone(),
                Arc::clone(&metrics),
            )
        };

        info!(batched = !self.batching.is_noop(), "output started");
        OutputHandle::new(self.name, tx, token, drain, worker, metrics)
    }
}

fn spawn_writer_stage<W>(
    writer: W,
    max_in_flight: usize,
    rx: mpsc::Receiver<contracts::Transaction>,
    token: CancellationToken,
    metrics: &Arc<OutputMetrics>,
) -> tokio::task::JoinHandle<()>
where
    W: Writer + Send + Sync + 'static,
{
    if max_in_flight <= 1 {
        spawn_sync(writer, rx, token, Arc::clone(metrics))
    } else {
        spawn_concurrent(writer, max_in_flight, rx, token, Arc::clone(metrics))
    }
}

/// Create an output from configuration
#[instrument(
    name = "create_output",
    skip(config),
    fields(output = %config.name, writer_type = ?config.writer_type)
)]
pub fn create_output(config: &OutputConfig) -> Result<OutputHandle, OutputError> {
    let builder = OutputBuilder::from_config(config);
    match config.writer_type {
        WriterType::Log => Ok(builder.spawn(LogWriter::new(&config.name))),
        WriterType::File => {
            let writer = FileWriter::from_params(&config.name, &config.params)?;
            Ok(builder.spawn(writer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::tests::ScriptedWriter;
    use contracts::{Batch, DeliveryError, Transaction, WriteError};
    use std::collections::HashMap;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_transparent_to_ack() {
        let handle = OutputBuilder::new("scripted").spawn(ScriptedWriter::new(vec![
            Err(WriteError::retryable("busy")),
            Err(WriteError::connection_lost("reset")),
            Ok(()),
        ]));

        let (t, r) = Transaction::new(Batch::from_payloads(["a"]));
        assert!(handle.send(t).await);
        assert_eq!(r.wait().await, Ok(()));
        assert_eq!(handle.metrics().retry_count(), 2);
        assert_eq!(handle.metrics().failure_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_nack() {
        let handle = OutputBuilder::new("scripted")
            .retry(RetryConfig {
                max_retries: 1,
                ..Default::default()
            })
            .spawn(ScriptedWriter::new(vec![Err(WriteError::retryable("busy")); 3]));

        let (t, r) = Transaction::new(Batch::from_payloads(["a"]));
        handle.send(t).await;
        assert_eq!(
            r.wait().await,
            Err(DeliveryError::Write(WriteError::retryable("busy")))
        );
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_drain_flushes_count_only_output() {
        let handle = OutputBuilder::new("scripted")
            .batching(BatchPolicyConfig {
                count: 10,
                ..Default::default()
            })
            .spawn(ScriptedWriter::new(vec![]));

        let (t, first) = Transaction::new(Batch::from_payloads(["a"]));
        assert!(handle.send(t).await);
        handle.drain();
        assert_eq!(first.wait().await, Ok(()));

        let (t, second) = Transaction::new(Batch::from_payloads(["b"]));
        assert!(handle.send(t).await);
        assert_eq!(second.wait().await, Ok(()));
        assert_eq!(handle.metrics().batch_count(), 2);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let mut handle = OutputBuilder::new("scripted").spawn(ScriptedWriter::new(vec![]));
        handle.close_async();
        assert!(handle.sender().is_none());

        let (t, r) = Transaction::new(Batch::from_payloads(["a"]));
        assert!(!handle.send(t).await);
        assert_eq!(r.wait().await, Err(DeliveryError::ShutdownInProgress));
        handle.wait_for_close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_close_times_out_on_stuck_write() {
        let mut handle = OutputBuilder::new("stuck")
            .retry(RetryConfig {
                max_retries: 0,
                initial_interval_ms: 1_000,
                max_interval_ms: 1_000,
                ..Default::default()
            })
            .spawn(ScriptedWriter::new(vec![Err(WriteError::retryable("down")); 100]));

        let (t, r) = Transaction::new(Batch::from_payloads(["a"]));
        handle.send(t).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.close_async();

        let err = handle
            .wait_for_close(Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        drop(r);
    }

    #[tokio::test]
    async fn test_create_file_output_requires_path() {
        let config = OutputConfig {
            name: "file".into(),
            writer_type: WriterType::File,
            params: HashMap::new(),
            ..Default::default()
        };
        assert!(matches!(
            create_output(&config),
            Err(OutputError::WriterCreation { .. })
        ));
    }
}
