//! 配置解析模块
//!
//! 同一份 `StreamConfig` 可以写成 TOML 或 JSON:
//! `[input]`、`[pipeline]` (processors 可嵌套，`try`/`catch` 的子阶段放在
//! 自己的 `processors` 里)、`[output]` 以及 `[resources.caches.<name>]`。
//! 这里只做反序列化，合法性检查交给 validator。

use contracts::{ContractError, StreamConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML，嵌套 processor 用 `[[pipeline.processors.processors]]`
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式 (大小写不敏感)
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

fn decode(content: &str, format: ConfigFormat) -> Result<StreamConfig, ContractError> {
    fn parse_error<E>(format: ConfigFormat, e: E) -> ContractError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ContractError::ConfigParse {
            message: format!("{} parse error: {e}", format.label()),
            source: Some(Box::new(e)),
        }
    }

    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_error(format, e)),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| parse_error(format, e)),
    }
}

/// 解析 TOML 格式的流配置
pub fn parse_toml(content: &str) -> Result<StreamConfig, ContractError> {
    decode(content, ConfigFormat::Toml)
}

/// 解析 JSON 格式的流配置
pub fn parse_json(content: &str) -> Result<StreamConfig, ContractError> {
    decode(content, ConfigFormat::Json)
}

/// 根据格式解析流配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<StreamConfig, ContractError> {
    decode(content, format)
}
