//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use contracts::StreamConfig;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    output: String,
    writer_type: String,
    processor_count: usize,
    cache_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    output: config.output.name.clone(),
                    writer_type: format!("{:?}", config.output.writer_type),
                    processor_count: count_processors(&config.pipeline.processors),
                    cache_count: config.resources.caches.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn count_processors(processors: &[contracts::ProcessorConfig]) -> usize {
    processors
        .iter()
        .map(|p| 1 + count_processors(&p.processors))
        .sum()
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &StreamConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.input.max_redeliveries == 0 {
        warnings.push(
            "input.max_redeliveries is 0 - nacked batches are redelivered forever".to_string(),
        );
    }

    if config.output.retry.max_retries == 0 && config.output.retry.max_elapsed_ms == 0 {
        warnings.push("output.retry is unbounded - a failing writer retries forever".to_string());
    }

    let has_catch = config
        .pipeline
        .processors
        .iter()
        .any(|p| p.processor_type == "catch" || p.processor_type == "drop_failed");
    if !config.pipeline.processors.is_empty() && !has_catch {
        warnings.push(
            "no top-level catch/drop_failed - failed parts will nack their transaction"
                .to_string(),
        );
    }

    let referenced: Vec<&str> = config
        .pipeline
        .processors
        .iter()
        .flat_map(flatten)
        .filter(|p| p.processor_type == "cache")
        .filter_map(|p| p.params.get("resource").map(String::as_str))
        .collect();
    for name in config.resources.caches.keys() {
        if !referenced.contains(&name.as_str()) {
            warnings.push(format!("Cache '{}' is not used by any processor", name));
        }
    }

    warnings
}

fn flatten(processor: &contracts::ProcessorConfig) -> Vec<&contracts::ProcessorConfig> {
    let mut all = vec![processor];
    for child in &processor.processors {
        all.extend(flatten(child));
    }
    all
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Output: {} ({})", summary.output, summary.writer_type);
            println!("  Processors: {}", summary.processor_count);
            println!("  Caches: {}", summary.cache_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CacheConfig, CacheType, ProcessorConfig};
    use std::io::Write;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_file() {
        let (_file, args) = args_for(
            r#"
[output]
name = "out"
type = "log"
"#,
        );
        let result = validate_config(&args);
        assert!(result.valid);
        assert_eq!(result.summary.unwrap().output, "out");
    }

    #[test]
    fn test_invalid_file_reports_error() {
        let (_file, args) = args_for(
            r#"
[output]
name = "out"
type = "file"
"#,
        );
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("path"));
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "does/not/exist.toml".into(),
            json: false,
        };
        assert!(!validate_config(&args).valid);
    }

    #[test]
    fn test_unused_cache_warning() {
        let mut config = StreamConfig::default();
        config.pipeline.processors = vec![ProcessorConfig::new("try")
            .with_children(vec![ProcessorConfig::new("cache").with_param("resource", "a")])];
        for name in ["a", "b"] {
            config.resources.caches.insert(
                name.into(),
                CacheConfig {
                    cache_type: CacheType::Memory,
                    memory: Default::default(),
                    subprocess: Default::default(),
                },
            );
        }

        let warnings = collect_warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("'b'")));
        assert!(!warnings.iter().any(|w| w.contains("'a'")));
        assert!(warnings.iter().any(|w| w.contains("no top-level catch")));
    }

    #[test]
    fn test_count_nested_processors() {
        let processors = vec![
            ProcessorConfig::new("try").with_children(vec![ProcessorConfig::new("noop")]),
            ProcessorConfig::new("noop"),
        ];
        assert_eq!(count_processors(&processors), 3);
    }
}
