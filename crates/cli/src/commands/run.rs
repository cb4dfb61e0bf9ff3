//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Stream, StreamOptions};
use contracts::StreamConfig;
use ingestion::LineSource;

/// Execute the `run` command
pub async fn run_stream(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;

    info!(
        output = %config.output.name,
        writer_type = ?config.output.writer_type,
        processors = config.pipeline.processors.len(),
        caches = config.resources.caches.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let source_name = args
        .input
        .as_ref()
        .map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
    let source = LineSource::new(source_name, reader, config.input.batch_lines);

    let stream = Stream::new(StreamOptions {
        config,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting stream...");
    let stats = stream
        .run(source, shutdown_signal())
        .await
        .context("Stream execution failed")?;

    info!(
        acked = stats.delivery.acked,
        nacked = stats.delivery.nacked,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.2}", stats.throughput()),
        "Stream completed"
    );
    stats.print_summary();

    if stats.incomplete_shutdown {
        anyhow::bail!(
            "Shutdown incomplete: work was still in flight after {}s",
            args.shutdown_timeout
        );
    }

    info!("Conveyor finished");
    Ok(())
}

/// Load the configuration file, or defaults when none is given
fn load_config(args: &RunArgs) -> Result<StreamConfig> {
    match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(StreamConfig::default())
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &StreamConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Input:");
    println!("  Queue capacity: {}", config.input.queue_capacity);
    println!("  Max pending: {}", config.input.max_pending);
    println!("  Max redeliveries: {}", config.input.max_redeliveries);

    println!("\nPipeline ({} threads):", config.pipeline.threads);
    print_processors(&config.pipeline.processors, 1);

    let output = &config.output;
    println!("\nOutput:");
    println!("  {} ({:?})", output.name, output.writer_type);
    println!("  Max in flight: {}", output.max_in_flight);
    if !output.batching.is_noop() {
        println!(
            "  Batching: count={} byte_size={} period_ms={}",
            output.batching.count, output.batching.byte_size, output.batching.period_ms
        );
    }
    println!(
        "  Retry: max_retries={} backoff={}..{}ms x{}",
        output.retry.max_retries,
        output.retry.initial_interval_ms,
        output.retry.max_interval_ms,
        output.retry.multiplier
    );

    if !config.resources.caches.is_empty() {
        println!("\nCaches ({}):", config.resources.caches.len());
        for (name, cache) in &config.resources.caches {
            println!("  - {} ({:?})", name, cache.cache_type);
        }
    }

    println!();
}

fn print_processors(processors: &[contracts::ProcessorConfig], depth: usize) {
    for processor in processors {
        println!("{}- {}", "  ".repeat(depth), processor.processor_type);
        print_processors(&processor.processors, depth + 1);
    }
}
