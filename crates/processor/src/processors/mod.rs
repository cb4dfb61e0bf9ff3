//! Built-in processors
//!
//! Each processor transforms parts independently; a failure on one part is
//! recorded as that part's error annotation and never touches its siblings.

mod cache;
mod drop_failed;
mod json;
mod log;
mod metadata;
mod noop;
mod text;

pub use cache::{CacheOperator, CacheProcessor, KeySource};
pub use drop_failed::DropFailedProcessor;
pub use json::ParseJsonProcessor;
pub use log::LogProcessor;
pub use metadata::MetadataProcessor;
pub use noop::NoopProcessor;
pub use text::{TextOperator, TextProcessor};

use contracts::{Batch, ContractError, MessagePart, PartError, ProcessorConfig};
use observability::record_processor_error;

/// Apply `f` to every part; an `Err` marks the original part failed
pub(crate) fn map_parts<F>(name: &str, batch: Batch, mut f: F) -> Batch
where
    F: FnMut(MessagePart) -> Result<MessagePart, (MessagePart, String)>,
{
    batch
        .into_iter()
        .map(|part| match f(part) {
            Ok(part) => part,
            Err((part, message)) => fail_part(name, part, message),
        })
        .collect()
}

/// Annotate a part with a failure raised by `name`
pub(crate) fn fail_part(name: &str, part: MessagePart, message: impl Into<String>) -> MessagePart {
    record_processor_error(name);
    part.with_error(PartError::new(name, message))
}

/// Fetch a mandatory parameter
pub(crate) fn required_param<'a>(
    config: &'a ProcessorConfig,
    key: &str,
) -> Result<&'a str, ContractError> {
    config
        .params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| {
            ContractError::config_validation(
                format!("processors.{}.{}", config.processor_type, key),
                "missing required parameter",
            )
        })
}

/// Fetch an optional parameter
pub(crate) fn optional_param<'a>(config: &'a ProcessorConfig, key: &str) -> Option<&'a str> {
    config.params.get(key).map(String::as_str)
}
