//! JSON validation

use async_trait::async_trait;
use contracts::{Batch, Processor};

use super::map_parts;

/// Parses each payload as JSON and re-serializes it compactly
///
/// Parts that are not valid JSON are marked failed with the parser message.
#[derive(Debug, Default)]
pub struct ParseJsonProcessor;

#[async_trait]
impl Processor for ParseJsonProcessor {
    fn name(&self) -> &str {
        "parse_json"
    }

    async fn process(&self, batch: Batch) -> Batch {
        map_parts(self.name(), batch, |part| {
            let value: serde_json::Value = match serde_json::from_slice(part.payload()) {
                Ok(value) => value,
                Err(e) => return Err((part, e.to_string())),
            };
            match serde_json::to_vec(&value) {
                Ok(normalized) => Ok(part.with_payload(normalized)),
                Err(e) => Err((part, e.to_string())),
            }
        })
    }
}
