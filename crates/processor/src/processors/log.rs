use async_trait::async_trait;
use contracts::{Batch, ContractError, Processor, ProcessorConfig};
use tracing::{debug, info, warn, Level};

use super::optional_param;

/// Logs every part at the configured level and passes the batch on
#[derive(Debug)]
pub struct LogProcessor {
    level: Level,
    message: String,
}

impl LogProcessor {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ContractError> {
        let level = match optional_param(config, "level").unwrap_or("info") {
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            other => {
                return Err(ContractError::config_validation(
                    "processors.log.level",
                    format!("unsupported level '{other}'"),
                ))
            }
        };
        Ok(Self::new(
            level,
            optional_param(config, "message").unwrap_or("message part"),
        ))
    }
}

#[async_trait]
impl Processor for LogProcessor {
    fn name(&self) -> &str {
        "log"
    }

    async fn process(&self, batch: Batch) -> Batch {
        for (index, part) in batch.iter().enumerate() {
            let payload = String::from_utf8_lossy(part.payload());
            let error = part.error().map(ToString::to_string);
            match self.level {
                Level::DEBUG => debug!(index, %payload, ?error, "{}", self.message),
                Level::WARN => warn!(index, %payload, ?error, "{}", self.message),
                _ => info!(index, %payload, ?error, "{}", self.message),
            }
        }
        batch
    }
}
