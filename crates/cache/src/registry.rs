//! CacheRegistry - named cache resources built once at startup

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{Cache, CacheConfig, CacheType, ContractError, ResourcesConfig};
use tracing::{debug, instrument};

use crate::{MemoryCache, SubprocessCache};

/// Named cache instances shared by every processor that references them
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: HashMap<String, Arc<dyn Cache>>,
}

impl CacheRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every cache declared in the resources section
    #[instrument(
        name = "cache_registry_from_config",
        skip(config),
        fields(cache_count = config.caches.len())
    )]
    pub fn from_config(config: &ResourcesConfig) -> Result<Self, ContractError> {
        let mut registry = Self::new();
        for (name, cache_config) in &config.caches {
            let cache = create_cache(cache_config).map_err(|e| {
                ContractError::config_validation(format!("resources.caches.{name}"), e.to_string())
            })?;
            debug!(cache = %name, cache_type = ?cache_config.cache_type, "cache resource created");
            registry.insert(name.clone(), cache);
        }
        Ok(registry)
    }

    /// Register a cache under a name, replacing any previous one
    pub fn insert(&mut self, name: impl Into<String>, cache: Arc<dyn Cache>) {
        self.caches.insert(name.into(), cache);
    }

    /// Look up a cache by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Cache>> {
        self.caches.get(name).cloned()
    }

    /// Registered cache names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn create_cache(config: &CacheConfig) -> Result<Arc<dyn Cache>, ContractError> {
    match config.cache_type {
        CacheType::Memory => Ok(Arc::new(MemoryCache::from_config(&config.memory))),
        CacheType::Subprocess => Ok(Arc::new(SubprocessCache::from_config(&config.subprocess)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{MemoryCacheConfig, SubprocessCacheConfig};

    #[tokio::test]
    async fn test_registry_from_config() {
        let mut resources = ResourcesConfig::default();
        resources.caches.insert(
            "dedupe".to_string(),
            CacheConfig {
                cache_type: CacheType::Memory,
                memory: MemoryCacheConfig { ttl_ms: 0 },
                subprocess: SubprocessCacheConfig::default(),
            },
        );

        let registry = CacheRegistry::from_config(&resources).unwrap();
        let cache = registry.get("dedupe").unwrap();
        cache.set("k", Bytes::from("v")).await.unwrap();

        // Same instance is handed out on every lookup.
        let again = registry.get("dedupe").unwrap();
        assert_eq!(again.get("k").await.unwrap(), Bytes::from("v"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_rejects_unnamed_subprocess() {
        let mut resources = ResourcesConfig::default();
        resources.caches.insert(
            "ext".to_string(),
            CacheConfig {
                cache_type: CacheType::Subprocess,
                memory: MemoryCacheConfig::default(),
                subprocess: SubprocessCacheConfig::default(),
            },
        );

        let err = CacheRegistry::from_config(&resources).unwrap_err();
        assert!(err.to_string().contains("resources.caches.ext"));
    }
}
