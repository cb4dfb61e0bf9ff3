//! Stream orchestrator - wires input, processors and output together.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Context;
use cache::CacheRegistry;
use contracts::StreamConfig;
use ingestion::{BatchSource, IngestionPipeline, IngestionReport};
use output::OutputHandle;
use processor::{ProcessorPipeline, ProcessorRegistry};
use tracing::{info, warn};

use super::StreamStats;

/// Stream run options
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Validated stream configuration
    pub config: StreamConfig,

    /// Stop the stream after this long (None = until the input ends)
    pub timeout: Option<Duration>,

    /// Bound on waiting for the output to close
    pub shutdown_timeout: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main stream orchestrator
pub struct Stream {
    options: StreamOptions,
}

impl Stream {
    /// Create a new stream with the given options
    pub fn new(options: StreamOptions) -> Self {
        Self { options }
    }

    /// Run until the source is exhausted, the timeout fires or `shutdown` resolves
    pub async fn run<S, F>(self, source: S, shutdown: F) -> anyhow::Result<StreamStats>
    where
        S: BatchSource + 'static,
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let config = &self.options.config;

        if let Some(port) = self.options.metrics_port {
            observability::install_prometheus(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Shared resources
        let caches =
            CacheRegistry::from_config(&config.resources).context("Failed to create caches")?;

        // Processor chain
        let chain = ProcessorRegistry::with_builtins()
            .build_chain(&config.pipeline.processors, &caches)
            .context("Failed to build processor chain")?;
        info!(stages = ?chain.stage_names(), "Processor chain built");

        // Output
        let mut output =
            output::create_output(&config.output).context("Failed to create output")?;
        let output_tx = output
            .sender()
            .context("Output closed before the stream started")?;
        let output_metrics = std::sync::Arc::clone(output.metrics());

        // Input
        let mut ingestion = IngestionPipeline::new(config.input.clone());
        let input_rx = ingestion
            .take_receiver()
            .context("Failed to get ingestion receiver")?;
        let ingestion_token = ingestion.token();
        let ingestion_metrics = ingestion.metrics();

        let processors =
            ProcessorPipeline::spawn(chain, config.pipeline.threads, input_rx, output_tx);
        let pipeline_metrics = processors.metrics();

        info!(
            output = %output.name(),
            threads = config.pipeline.threads,
            max_in_flight = config.output.max_in_flight,
            "Stream running"
        );

        // Once the source is exhausted only redeliveries remain, so partial
        // batches must not wait for a size trigger.
        let exhausted = ingestion.exhausted();
        let drain = output.drain_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = exhausted.cancelled() => drain.cancel(),
                _ = drain.cancelled() => {}
            }
        });

        let mut ingest = tokio::spawn(ingestion.run(source));
        let timeout = async {
            match self.options.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        let finished = tokio::select! {
            result = &mut ingest => Some(result),
            _ = shutdown => {
                warn!("Received shutdown signal, stopping stream...");
                None
            }
            _ = timeout => {
                warn!(timeout_secs = self.options.timeout.map(|t| t.as_secs()), "Stream timed out");
                None
            }
        };
        let interrupted = finished.is_none();

        let deadline = tokio::time::Instant::now() + self.options.shutdown_timeout;
        let mut complete = true;
        let report = match finished {
            Some(result) => {
                complete &= close_output(&mut output, deadline).await;
                ingestion_report(result)
            }
            None => {
                ingestion_token.cancel();
                complete &= close_output(&mut output, deadline).await;
                match tokio::time::timeout_at(deadline, &mut ingest).await {
                    Ok(result) => ingestion_report(result),
                    Err(_) => {
                        warn!("Ingestion did not finish in time, aborting");
                        ingest.abort();
                        complete = false;
                        None
                    }
                }
            }
        };

        // Workers exit once the input channel is closed and drained.
        complete &= processors
            .join_within(deadline.saturating_duration_since(tokio::time::Instant::now()))
            .await;
        if !complete {
            warn!(
                shutdown_timeout_secs = self.options.shutdown_timeout.as_secs_f64(),
                "Shutdown incomplete, in-flight work abandoned"
            );
        }

        let stats = StreamStats {
            duration: start_time.elapsed(),
            interrupted,
            incomplete_shutdown: !complete,
            ingestion: ingestion_metrics.snapshot(),
            delivery: report.map(|r| r.summary).unwrap_or_default(),
            processed: pipeline_metrics.received(),
            filtered: pipeline_metrics.filtered(),
            output: output_metrics.snapshot(),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            acked = stats.delivery.acked,
            nacked = stats.delivery.nacked,
            "Stream shutdown complete"
        );

        Ok(stats)
    }
}

/// Stop admission and wait for in-flight writes until `deadline`
///
/// Returns `false` if the output was still busy at the deadline.
async fn close_output(output: &mut OutputHandle, deadline: tokio::time::Instant) -> bool {
    output.close_async();
    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
    match output.wait_for_close(remaining).await {
        Ok(()) => true,
        Err(e) => {
            warn!(output = %output.name(), error = %e, "Output did not close in time");
            false
        }
    }
}

/// Unwrap the ingestion task result, logging failures
fn ingestion_report(
    result: Result<ingestion::Result<IngestionReport>, tokio::task::JoinError>,
) -> Option<IngestionReport> {
    match result {
        Ok(Ok(report)) => Some(report),
        Ok(Err(e)) => {
            warn!(error = %e, "Ingestion stopped with an error");
            None
        }
        Err(e) => {
            warn!(error = %e, "Ingestion task failed");
            None
        }
    }
}
