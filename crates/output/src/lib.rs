//! # Output
//!
//! 输出模块：把事务写入下游并回传确认。
//!
//! 负责：
//! - 批处理策略（数量 / 字节 / 时间触发，关闭时强制刷新）
//! - 同步写入（单个在途）与并发写入（信号量限制在途数量）
//! - 重试包装（指数退避，连接丢失时透明重连）
//! - `close_async` + `wait_for_close(timeout)` 关闭协议
//!
//! ```ignore
//! let mut output = output::create_output(&config.output)?;
//! pipeline_tx = output.sender();
//! // ...
//! output.close_async();
//! output.wait_for_close(Duration::from_secs(5)).await?;
//! ```

mod batcher;
pub mod builder;
mod concurrent;
mod delivery;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod policy;
pub mod retry;
pub mod sinks;
mod synchronous;

pub use batcher::spawn_batcher;
pub use builder::{create_output, OutputBuilder};
pub use concurrent::spawn_concurrent;
pub use contracts::{Writer, WriterState};
pub use error::OutputError;
pub use handle::OutputHandle;
pub use metrics::{MetricsSnapshot, OutputMetrics};
pub use policy::BatchPolicy;
pub use retry::{Backoff, Retry, RetryMachine, RetryState};
pub use sinks::{FileWriter, FileWriterConfig, LogWriter};
pub use synchronous::spawn_sync;
