//! Cache-backed processor

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{Batch, Cache, ContractError, MessagePart, Processor, ProcessorConfig};
use tracing::debug;

use super::{fail_part, optional_param, required_param};

/// Operation performed against the cache for each part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOperator {
    /// Replace the payload with the cached value
    Get,
    /// Store the payload under the key
    Set,
    /// Store the payload only if the key is absent
    Add,
    /// Remove the key
    Delete,
}

impl std::str::FromStr for CacheOperator {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            "add" => Ok(Self::Add),
            "delete" => Ok(Self::Delete),
            other => Err(ContractError::config_validation(
                "processors.cache.operator",
                format!("unknown operator '{other}'"),
            )),
        }
    }
}

/// Where a part's cache key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Same key for every part
    Literal(String),
    /// Value of a metadata entry
    Metadata(String),
    /// The payload itself, as UTF-8
    Payload,
}

impl KeySource {
    fn resolve(&self, part: &MessagePart) -> Result<String, String> {
        match self {
            Self::Literal(key) => Ok(key.clone()),
            Self::Metadata(name) => part
                .get_metadata(name)
                .map(str::to_string)
                .ok_or_else(|| format!("metadata '{name}' is not set")),
            Self::Payload => std::str::from_utf8(part.payload())
                .map(str::to_string)
                .map_err(|e| format!("payload key is not valid utf-8: {e}")),
        }
    }
}

/// Runs a cache operation per part against a shared cache resource
///
/// Cache errors (`NotFound` on get, `AlreadyExists` on add) fail only the
/// part they occurred on.
pub struct CacheProcessor {
    resource: String,
    cache: Arc<dyn Cache>,
    operator: CacheOperator,
    key: KeySource,
}

impl CacheProcessor {
    pub fn new(
        resource: impl Into<String>,
        cache: Arc<dyn Cache>,
        operator: CacheOperator,
        key: KeySource,
    ) -> Self {
        Self {
            resource: resource.into(),
            cache,
            operator,
            key,
        }
    }

    /// Build from `resource`, `operator` and one of `key` / `key_meta`
    pub fn from_config(
        config: &ProcessorConfig,
        caches: &cache::CacheRegistry,
    ) -> Result<Self, ContractError> {
        let resource = required_param(config, "resource")?;
        let cache = caches.get(resource).ok_or_else(|| {
            ContractError::config_validation(
                "processors.cache.resource",
                format!("cache resource '{resource}' is not defined"),
            )
        })?;
        let operator = required_param(config, "operator")?.parse()?;
        let key = match (optional_param(config, "key"), optional_param(config, "key_meta")) {
            (Some(_), Some(_)) => {
                return Err(ContractError::config_validation(
                    "processors.cache.key",
                    "set either key or key_meta, not both",
                ))
            }
            (Some(key), None) => KeySource::Literal(key.to_string()),
            (None, Some(name)) => KeySource::Metadata(name.to_string()),
            (None, None) => KeySource::Payload,
        };
        Ok(Self::new(resource, cache, operator, key))
    }

    async fn apply(&self, part: MessagePart) -> MessagePart {
        let key = match self.key.resolve(&part) {
            Ok(key) => key,
            Err(message) => return fail_part("cache", part, message),
        };
        let result = match self.operator {
            CacheOperator::Get => match self.cache.get(&key).await {
                Ok(value) => return part.with_payload(value),
                Err(e) => Err(e),
            },
            CacheOperator::Set => self.cache.set(&key, part.payload().clone()).await,
            CacheOperator::Add => self.cache.add(&key, part.payload().clone()).await,
            CacheOperator::Delete => self.cache.delete(&key).await,
        };
        match result {
            Ok(()) => part,
            Err(e) => {
                debug!(resource = %self.resource, key = %key, error = %e, "cache operation failed");
                fail_part("cache", part, format!("{}: {e}", self.resource))
            }
        }
    }
}

#[async_trait]
impl Processor for CacheProcessor {
    fn name(&self) -> &str {
        "cache"
    }

    async fn process(&self, batch: Batch) -> Batch {
        let mut out = Batch::new();
        for part in batch {
            out.push(self.apply(part).await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cache::{CacheRegistry, MemoryCache};

    fn memory() -> Arc<dyn Cache> {
        Arc::new(MemoryCache::new())
    }

    #[tokio::test]
    async fn test_get_replaces_payload_and_missing_key_fails_part() {
        let store = memory();
        store.set("k1", Bytes::from_static(b"v1")).await.unwrap();
        let processor = CacheProcessor::new("mem", store, CacheOperator::Get, KeySource::Payload);

        let out = processor.process(Batch::from_payloads(["k1", "k2"])).await;

        assert_eq!(out.get(0).unwrap().payload().as_ref(), b"v1");
        let failed = out.get(1).unwrap();
        assert_eq!(failed.payload().as_ref(), b"k2");
        assert!(failed.error().unwrap().message.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_add_conflict_fails_second_part() {
        let store = memory();
        let processor = CacheProcessor::new(
            "mem",
            store.clone(),
            CacheOperator::Add,
            KeySource::Literal("seen".into()),
        );

        let out = processor.process(Batch::from_payloads(["first", "second"])).await;

        assert!(!out.get(0).unwrap().is_failed());
        assert!(out.get(1).unwrap().is_failed());
        assert_eq!(store.get("seen").await.unwrap().as_ref(), b"first");
    }

    #[tokio::test]
    async fn test_metadata_key_source() {
        let store = memory();
        let processor = CacheProcessor::new(
            "mem",
            store.clone(),
            CacheOperator::Set,
            KeySource::Metadata("id".into()),
        );
        let batch: Batch = vec![
            MessagePart::new("payload").with_metadata("id", "42"),
            MessagePart::new("no id"),
        ]
        .into();

        let out = processor.process(batch).await;

        assert_eq!(store.get("42").await.unwrap().as_ref(), b"payload");
        assert!(out.get(1).unwrap().is_failed());
    }

    #[test]
    fn test_from_config_requires_known_resource() {
        let mut caches = CacheRegistry::default();
        caches.insert("mem", memory());

        let config = ProcessorConfig::new("cache")
            .with_param("resource", "mem")
            .with_param("operator", "get")
            .with_param("key_meta", "id");
        let processor = CacheProcessor::from_config(&config, &caches).unwrap();
        assert_eq!(processor.key, KeySource::Metadata("id".into()));

        let unknown = ProcessorConfig::new("cache")
            .with_param("resource", "other")
            .with_param("operator", "get");
        assert!(CacheProcessor::from_config(&unknown, &caches).is_err());

        let bad_op = ProcessorConfig::new("cache")
            .with_param("resource", "mem")
            .with_param("operator", "flush");
        assert!(CacheProcessor::from_config(&bad_op, &caches).is_err());
    }
}
