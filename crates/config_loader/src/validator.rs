//! 配置校验模块
//!
//! 校验规则：
//! - 数值字段范围 (validator derive)
//! - retry.initial_interval_ms <= retry.max_interval_ms
//! - processor 类型已注册，try/catch 必须有子节点
//! - cache processor 引用的资源存在
//! - subprocess cache 必须配置命令
//! - output 必填字段齐全

use contracts::{
    CacheType, ContractError, OutputConfig, ProcessorConfig, StreamConfig, WriterType,
    BRANCH_PROCESSORS, BUILTIN_PROCESSORS,
};
use validator::Validate;

/// 校验 StreamConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &StreamConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_retry(config)?;
    validate_processors(config, &config.pipeline.processors, "pipeline.processors")?;
    validate_caches(config)?;
    validate_output(&config.output)?;
    Ok(())
}

/// 校验 derive 规则
fn validate_fields(config: &StreamConfig) -> Result<(), ContractError> {
    config
        .validate()
        .map_err(|e| ContractError::config_validation("config", e.to_string()))
}

/// 校验退避区间
fn validate_retry(config: &StreamConfig) -> Result<(), ContractError> {
    let retry = &config.output.retry;
    if retry.initial_interval_ms > retry.max_interval_ms {
        return Err(ContractError::config_validation(
            "output.retry.initial_interval_ms / output.retry.max_interval_ms",
            format!(
                "initial_interval_ms ({}) must be <= max_interval_ms ({})",
                retry.initial_interval_ms, retry.max_interval_ms
            ),
        ));
    }
    Ok(())
}

/// 递归校验 processor 链
fn validate_processors(
    config: &StreamConfig,
    processors: &[ProcessorConfig],
    path: &str,
) -> Result<(), ContractError> {
    for (idx, processor) in processors.iter().enumerate() {
        let field = format!("{path}[{idx}]");
        let kind = processor.processor_type.as_str();

        if !BUILTIN_PROCESSORS.contains(&kind) {
            return Err(ContractError::config_validation(
                format!("{field}.type"),
                format!("unknown processor type '{kind}'"),
            ));
        }

        let is_branch = BRANCH_PROCESSORS.contains(&kind);
        if is_branch && processor.processors.is_empty() {
            return Err(ContractError::config_validation(
                format!("{field}.processors"),
                format!("'{kind}' requires at least one child processor"),
            ));
        }
        if !is_branch && !processor.processors.is_empty() {
            return Err(ContractError::config_validation(
                format!("{field}.processors"),
                format!("'{kind}' does not accept child processors"),
            ));
        }

        if kind == "cache" {
            let resource = processor.params.get("resource").ok_or_else(|| {
                ContractError::config_validation(
                    format!("{field}.params.resource"),
                    "cache processor requires a resource",
                )
            })?;
            if !config.resources.caches.contains_key(resource) {
                return Err(ContractError::config_validation(
                    format!("{field}.params.resource"),
                    format!("cache resource '{resource}' not found in resources.caches"),
                ));
            }
        }

        validate_processors(config, &processor.processors, &format!("{field}.processors"))?;
    }
    Ok(())
}

/// 校验 cache 资源
fn validate_caches(config: &StreamConfig) -> Result<(), ContractError> {
    for (name, cache) in &config.resources.caches {
        if cache.cache_type == CacheType::Subprocess && cache.subprocess.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("resources.caches.{name}.subprocess.name"),
                "subprocess cache requires a command name",
            ));
        }
    }
    Ok(())
}

/// 校验 output 配置
fn validate_output(output: &OutputConfig) -> Result<(), ContractError> {
    if output.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "output.name",
            "output name cannot be empty",
        ));
    }

    if output.writer_type == WriterType::File
        && !output.params.get("path").is_some_and(|p| !p.is_empty())
    {
        return Err(ContractError::config_validation(
            "output.params.path",
            "file output requires a path",
        ));
    }
    Ok(())
}
