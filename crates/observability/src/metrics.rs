//! 投递管道指标收集模块
//!
//! `record_*` 函数写入全局 metrics recorder；`DeliveryAggregator` 在内存中
//! 汇总确认结果，用于运行结束时输出摘要。

use std::collections::HashMap;
use std::time::Duration;

use contracts::{AckResult, DeliveryError};
use metrics::{counter, gauge, histogram};

/// 记录处理器在某个 part 上失败
pub fn record_processor_error(processor: &str) {
    counter!(
        "conveyor_processor_errors_total",
        "processor" => processor.to_string()
    )
    .increment(1);
}

/// 记录处理器链输出的 part 数量
pub fn record_parts_processed(count: usize) {
    counter!("conveyor_parts_processed_total").increment(count as u64);
}

/// 记录事务最终确认结果
pub fn record_transaction(result: &AckResult) {
    counter!(
        "conveyor_transactions_total",
        "status" => ack_status(result)
    )
    .increment(1);
}

/// 记录一次重新投递
pub fn record_redelivery(attempt: u32) {
    counter!("conveyor_redeliveries_total").increment(1);
    gauge!("conveyor_redelivery_attempt").set(attempt as f64);
}

/// 记录批处理策略产出的一个批次
pub fn record_batch_flushed(parts: usize, bytes: usize, contributors: usize) {
    counter!("conveyor_batches_flushed_total").increment(1);
    histogram!("conveyor_batch_parts").record(parts as f64);
    histogram!("conveyor_batch_bytes").record(bytes as f64);
    histogram!("conveyor_batch_transactions").record(contributors as f64);
}

/// 记录一次写入（包含重试后的最终结果）
pub fn record_write(writer: &str, success: bool, latency: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "conveyor_writes_total",
        "writer" => writer.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "conveyor_write_latency_ms",
        "writer" => writer.to_string()
    )
    .record(latency.as_secs_f64() * 1000.0);
}

/// 记录一次写入重试
pub fn record_write_retry(writer: &str) {
    counter!(
        "conveyor_write_retries_total",
        "writer" => writer.to_string()
    )
    .increment(1);
}

fn ack_status(result: &AckResult) -> &'static str {
    match result {
        Ok(()) => "acked",
        Err(DeliveryError::FailedParts { .. }) => "failed_parts",
        Err(DeliveryError::Write(_)) => "write_error",
        Err(DeliveryError::ShutdownInProgress) => "shutdown",
        Err(DeliveryError::AckDropped) => "dropped",
    }
}

/// 确认结果聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    /// 确认成功的事务数
    pub acked: u64,

    /// 按原因统计的否定确认
    pub nacked: HashMap<&'static str, u64>,

    /// 重新投递次数
    pub redelivered: u64,

    /// 从投递到确认的延迟（毫秒）
    pub ack_latency_ms: RunningStats,
}

impl DeliveryAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: &AckResult, latency: Duration) {
        match result {
            Ok(()) => self.acked += 1,
            Err(_) => *self.nacked.entry(ack_status(result)).or_insert(0) += 1,
        }
        self.ack_latency_ms.push(latency.as_secs_f64() * 1000.0);
    }

    /// 记录重新投递
    pub fn record_redelivery(&mut self) {
        self.redelivered += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DeliverySummary {
        let total_nacked = self.nacked.values().sum();
        let total = self.acked + total_nacked;
        DeliverySummary {
            acked: self.acked,
            nacked: total_nacked,
            redelivered: self.redelivered,
            nack_rate: if total > 0 {
                total_nacked as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            ack_latency_ms: StatsSummary::from(&self.ack_latency_ms),
            nack_reasons: self.nacked.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub acked: u64,
    pub nacked: u64,
    pub redelivered: u64,
    pub nack_rate: f64,
    pub ack_latency_ms: StatsSummary,
    pub nack_reasons: HashMap<&'static str, u64>,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Acked transactions: {}", self.acked)?;
        writeln!(
            f,
            "Nacked transactions: {} ({:.2}%)",
            self.nacked, self.nack_rate
        )?;
        writeln!(f, "Redeliveries: {}", self.redelivered)?;
        writeln!(f, "Ack latency (ms): {}", self.ack_latency_ms)?;

        if !self.nack_reasons.is_empty() {
            writeln!(f, "Nack reasons:")?;
            let mut reasons: Vec<_> = self.nack_reasons.iter().collect();
            reasons.sort();
            for (reason, count) in reasons {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
