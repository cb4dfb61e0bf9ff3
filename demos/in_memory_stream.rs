//! In-Memory Stream Example
//!
//! Loads a stream definition, then runs a handful of JSON messages through a
//! try/catch chain with a dedupe cache into a batched log output.
//!
//! Run with: cargo run --bin in_memory_stream

use std::time::Duration;

use cache::CacheRegistry;
use config_loader::{ConfigFormat, ConfigLoader};
use ingestion::{IngestionPipeline, StaticSource};
use processor::{ProcessorPipeline, ProcessorRegistry};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const STREAM: &str = r#"
[input]
max_redeliveries = 2

[pipeline]
threads = 2

[[pipeline.processors]]
type = "try"

[[pipeline.processors.processors]]
type = "parse_json"

[[pipeline.processors.processors]]
type = "cache"
params = { resource = "seen", operator = "add" }

[[pipeline.processors]]
type = "catch"

[[pipeline.processors.processors]]
type = "log"
params = { level = "warn", message = "dropping message" }

[[pipeline.processors.processors]]
type = "drop_failed"

[output]
name = "stdout"
type = "log"
max_in_flight = 2

[output.batching]
count = 4

[resources.caches.seen]
type = "memory"
memory = { ttl_ms = 60000 }
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting In-Memory Stream Demo");

    let config = ConfigLoader::load_from_str(STREAM, ConfigFormat::Toml)?;

    // ==== Stage 1: Resources and processor chain ====
    let caches = CacheRegistry::from_config(&config.resources)?;
    let chain = ProcessorRegistry::with_builtins().build_chain(&config.pipeline.processors, &caches)?;
    info!(stages = ?chain.stage_names(), "Processor chain built");

    // ==== Stage 2: Output ====
    let mut output = output::create_output(&config.output)?;
    let output_tx = output.sender().ok_or("output closed before start")?;

    // ==== Stage 3: Input and processor workers ====
    let mut ingestion = IngestionPipeline::new(config.input.clone());
    let rx = ingestion.take_receiver().ok_or("receiver already taken")?;
    let processors = ProcessorPipeline::spawn(chain, config.pipeline.threads, rx, output_tx);

    let messages = [
        r#"{"id": 1, "kind": "order"}"#,
        r#"{"id": 2, "kind": "refund"}"#,
        "not json at all",
        r#"{"id": 1, "kind": "order"}"#,
        r#"{"id": 3, "kind": "order"}"#,
        r#"{"id": 4, "kind": "order"}"#,
    ];

    // The last partial batch is flushed once the source runs dry.
    let exhausted = ingestion.exhausted();
    let drain = output.drain_token();
    tokio::spawn(async move {
        exhausted.cancelled().await;
        drain.cancel();
    });

    // ==== Stage 4: Run until every message is resolved ====
    let report = ingestion.run(StaticSource::from_payloads(messages)).await?;
    processors.join().await;

    // ==== Stage 5: Graceful Shutdown ====
    info!("Shutting down...");
    output.close_async();
    output.wait_for_close(Duration::from_secs(5)).await?;

    let metrics = output.metrics().snapshot();
    info!(
        writes = metrics.write_count,
        batches = metrics.batch_count,
        "Output closed"
    );
    println!("{}", report.summary);

    Ok(())
}
