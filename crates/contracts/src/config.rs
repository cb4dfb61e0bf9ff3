//! StreamConfig - Config Loader output
//!
//! Describes a complete stream: input queueing, processor chain, output
//! writer with batching and retry, and shared cache resources.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete stream configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct StreamConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Input queueing and redelivery
    #[serde(default)]
    #[validate(nested)]
    pub input: InputConfig,

    /// Processor chain
    #[serde(default)]
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Output writer
    #[serde(default)]
    #[validate(nested)]
    pub output: OutputConfig,

    /// Shared resources referenced by name
    #[serde(default)]
    pub resources: ResourcesConfig,
}

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InputConfig {
    /// Capacity of the transaction queue feeding the pipeline
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Batches read from the source but not yet acknowledged
    #[serde(default = "default_max_pending")]
    #[validate(range(min = 1))]
    pub max_pending: usize,

    /// Redeliveries of a nacked batch before it is abandoned (0 = unlimited)
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,

    /// Lines grouped into one batch by line-oriented sources
    #[serde(default = "default_batch_lines")]
    #[validate(range(min = 1))]
    pub batch_lines: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_pending: default_max_pending(),
            max_redeliveries: default_max_redeliveries(),
            batch_lines: default_batch_lines(),
        }
    }
}

/// Processor pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Number of workers pulling transactions in parallel
    #[serde(default = "default_threads")]
    #[validate(range(min = 1))]
    pub threads: usize,

    /// Ordered processor chain
    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            processors: Vec::new(),
        }
    }
}

/// Processor types registered by the built-in registry
pub const BUILTIN_PROCESSORS: &[&str] = &[
    "cache",
    "catch",
    "drop_failed",
    "log",
    "metadata",
    "noop",
    "parse_json",
    "text",
    "try",
];

/// Processor types that carry child stages
pub const BRANCH_PROCESSORS: &[&str] = &["catch", "try"];

/// A single processor stage
///
/// `try` and `catch` carry their children in `processors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Registered processor type name
    #[serde(rename = "type")]
    pub processor_type: String,

    /// Type specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,

    /// Child stages for branching processors
    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,
}

impl ProcessorConfig {
    /// Create a processor config without params
    pub fn new(processor_type: impl Into<String>) -> Self {
        Self {
            processor_type: processor_type.into(),
            ..Default::default()
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set child stages
    pub fn with_children(mut self, children: Vec<ProcessorConfig>) -> Self {
        self.processors = children;
        self
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OutputConfig {
    /// Output name
    #[validate(length(min = 1))]
    pub name: String,

    /// Writer type
    #[serde(rename = "type")]
    pub writer_type: WriterType,

    /// Writer specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,

    /// Maximum outstanding writes (1 = synchronous writer)
    #[serde(default = "default_max_in_flight")]
    #[validate(range(min = 1))]
    pub max_in_flight: usize,

    /// Capacity of the transaction queue feeding the output
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Batch policy applied before the writer
    #[serde(default)]
    pub batching: BatchPolicyConfig,

    /// Retry policy for failed writes
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: "log".to_string(),
            writer_type: WriterType::Log,
            params: HashMap::new(),
            max_in_flight: default_max_in_flight(),
            queue_capacity: default_queue_capacity(),
            batching: BatchPolicyConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Writer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterType {
    Log,
    File,
}

/// Batch policy triggers; zero means "not a trigger"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicyConfig {
    /// Flush once this many parts are buffered
    #[serde(default)]
    pub count: usize,

    /// Flush once buffered payloads reach this many bytes
    #[serde(default)]
    pub byte_size: usize,

    /// Flush once the oldest buffered item is this old (milliseconds)
    #[serde(default)]
    pub period_ms: u64,
}

impl BatchPolicyConfig {
    /// A policy without triggers passes transactions through one-in-one-out
    pub fn is_noop(&self) -> bool {
        self.count == 0 && self.byte_size == 0 && self.period_ms == 0
    }

    /// Period trigger, if configured
    pub fn period(&self) -> Option<Duration> {
        (self.period_ms > 0).then(|| Duration::from_millis(self.period_ms))
    }
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = unlimited)
    #[serde(default)]
    pub max_retries: u32,

    /// First backoff interval (milliseconds)
    #[serde(default = "default_initial_interval_ms")]
    #[validate(range(min = 1))]
    pub initial_interval_ms: u64,

    /// Backoff ceiling (milliseconds)
    #[serde(default = "default_max_interval_ms")]
    #[validate(range(min = 1))]
    pub max_interval_ms: u64,

    /// Growth factor between consecutive intervals
    #[serde(default = "default_multiplier")]
    #[validate(range(min = 1.0))]
    pub multiplier: f64,

    /// Give up once this much time has passed since the first attempt (0 = unbounded)
    #[serde(default)]
    pub max_elapsed_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            max_elapsed_ms: 0,
        }
    }
}

impl RetryConfig {
    /// First backoff interval
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    /// Backoff ceiling
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// Elapsed-time budget, if bounded
    pub fn max_elapsed(&self) -> Option<Duration> {
        (self.max_elapsed_ms > 0).then(|| Duration::from_millis(self.max_elapsed_ms))
    }
}

/// Shared resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Cache resources by name
    #[serde(default)]
    pub caches: HashMap<String, CacheConfig>,
}

/// Cache resource configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache type
    #[serde(rename = "type")]
    pub cache_type: CacheType,

    /// In-memory cache settings
    #[serde(default)]
    pub memory: MemoryCacheConfig,

    /// Subprocess cache settings
    #[serde(default)]
    pub subprocess: SubprocessCacheConfig,
}

/// Cache type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Memory,
    Subprocess,
}

/// In-memory cache settings
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Entry time-to-live in milliseconds (0 = never expire)
    #[serde(default)]
    pub ttl_ms: u64,
}

/// Subprocess cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubprocessCacheConfig {
    /// Command to execute
    #[serde(default)]
    pub name: String,

    /// Extra arguments inserted before the operation and key
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_pending() -> usize {
    256
}

fn default_max_redeliveries() -> u32 {
    3
}

fn default_batch_lines() -> usize {
    1
}

fn default_threads() -> usize {
    1
}

fn default_max_in_flight() -> usize {
    1
}

fn default_initial_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    3_000
}

fn default_multiplier() -> f64 {
    2.0
}
