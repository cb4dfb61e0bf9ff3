//! Text operators over UTF-8 payloads

use async_trait::async_trait;
use contracts::{Batch, ContractError, Processor, ProcessorConfig};

use super::{map_parts, optional_param, required_param};

/// Text transformation applied to each payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOperator {
    ToUpper,
    ToLower,
    Trim,
    Prepend(String),
    Append(String),
}

impl TextOperator {
    fn apply(&self, text: &str) -> String {
        match self {
            Self::ToUpper => text.to_uppercase(),
            Self::ToLower => text.to_lowercase(),
            Self::Trim => text.trim().to_string(),
            Self::Prepend(prefix) => format!("{prefix}{text}"),
            Self::Append(suffix) => format!("{text}{suffix}"),
        }
    }
}

/// Applies a `TextOperator`; non UTF-8 payloads fail the part
#[derive(Debug)]
pub struct TextProcessor {
    operator: TextOperator,
}

impl TextProcessor {
    pub fn new(operator: TextOperator) -> Self {
        Self { operator }
    }

    /// Build from `operator` and, for prepend/append, `value`
    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ContractError> {
        let value = || {
            optional_param(config, "value")
                .map(str::to_string)
                .ok_or_else(|| {
                    ContractError::config_validation(
                        "processors.text.value",
                        "prepend/append need a value",
                    )
                })
        };
        let operator = match required_param(config, "operator")? {
            "to_upper" => TextOperator::ToUpper,
            "to_lower" => TextOperator::ToLower,
            "trim" => TextOperator::Trim,
            "prepend" => TextOperator::Prepend(value()?),
            "append" => TextOperator::Append(value()?),
            other => {
                return Err(ContractError::config_validation(
                    "processors.text.operator",
                    format!("unknown operator '{other}'"),
                ))
            }
        };
        Ok(Self::new(operator))
    }
}

#[async_trait]
impl Processor for TextProcessor {
    fn name(&self) -> &str {
        "text"
    }

    async fn process(&self, batch: Batch) -> Batch {
        map_parts(self.name(), batch, |part| {
            let transformed = match std::str::from_utf8(part.payload()) {
                Ok(text) => self.operator.apply(text),
                Err(e) => return Err((part, format!("payload is not valid utf-8: {e}"))),
            };
            Ok(part.with_payload(transformed))
        })
    }
}
