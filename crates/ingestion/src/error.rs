//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 数据源读取失败
    #[error("failed to read from source {source_name}: {message}")]
    ReadFailed {
        /// 数据源名称
        source_name: String,
        /// 错误消息
        message: String,
    },

    /// 下游通道已关闭
    #[error("transaction channel closed")]
    ChannelClosed,
}

impl IngestionError {
    /// 创建读取错误
    pub fn read_failed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
