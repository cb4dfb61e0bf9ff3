use async_trait::async_trait;
use contracts::{Batch, ContractError, Processor, ProcessorConfig};

use super::required_param;

/// Sets one metadata entry on every part
#[derive(Debug)]
pub struct MetadataProcessor {
    key: String,
    value: String,
}

impl MetadataProcessor {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ContractError> {
        Ok(Self::new(
            required_param(config, "key")?,
            required_param(config, "value")?,
        ))
    }
}

#[async_trait]
impl Processor for MetadataProcessor {
    fn name(&self) -> &str {
        "metadata"
    }

    async fn process(&self, batch: Batch) -> Batch {
        batch
            .into_iter()
            .map(|part| part.with_metadata(self.key.clone(), self.value.clone()))
            .collect()
    }
}
