//! # Observability
//!
//! 日志与指标的安装入口。
//!
//! - Tracing: JSON/Pretty/Compact 三种输出，`RUST_LOG` 优先于 `-v`/`-q`
//! - Prometheus: 只有 `run` 命令需要，由 `install_prometheus` 单独安装
//! - `metrics` 子模块记录处理器、事务、写入指标，并汇总 ack 结果
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{metrics, ObservabilityConfig, LogFormat};
//!
//! observability::init_with_config(ObservabilityConfig::from_verbosity(1, false, LogFormat::Compact))?;
//!
//! let result = ack_rx.wait().await;
//! metrics::record_transaction(&result);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::metrics::{
    record_batch_flushed, record_parts_processed, record_processor_error, record_redelivery,
    record_transaction, record_write, record_write_retry, DeliveryAggregator, DeliverySummary,
    RunningStats, StatsSummary,
};

/// 日志和指标配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口，`None` 时不安装 exporter
    pub metrics_port: Option<u16>,
    /// `RUST_LOG` 未设置时使用的过滤指令
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self::from_verbosity(0, false, LogFormat::default())
    }
}

impl ObservabilityConfig {
    /// `-q` 只留 warn 以上；每个 `-v` 提高一级，最多到 trace
    pub fn from_verbosity(verbose: u8, quiet: bool, log_format: LogFormat) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            log_format,
            metrics_port: None,
            default_log_level: level.to_string(),
        }
    }

    /// 同时安装 Prometheus exporter
    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志，带文件和行号
    #[default]
    Json,
    /// 多行，便于本地阅读
    Pretty,
    /// 单行
    Compact,
}

/// 按默认配置初始化：JSON 日志，info 级别，不导出指标
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 安装全局 tracing subscriber，按需安装 Prometheus exporter
///
/// 每个进程只能成功调用一次。
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(config.filter());
    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
    installed.context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        level = %config.default_log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 在 `0.0.0.0:<port>` 上暴露 Prometheus 指标
///
/// 日志已经初始化之后由 `run` 命令调用。
pub fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
