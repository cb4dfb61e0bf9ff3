//! MemoryCache - in-process key/value map with optional TTL

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use contracts::{Cache, CacheError, MemoryCacheConfig};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory cache
///
/// Guarded by a `RwLock`; no lock is held across an await point. With a TTL,
/// writes sweep expired entries out of the map at most once per TTL period.
#[derive(Debug, Default)]
pub struct MemoryCache {
    ttl: Option<Duration>,
    items: RwLock<HashMap<String, Entry>>,
    /// Earliest time of the next sweep (None = due)
    next_sweep: Mutex<Option<Instant>>,
}

impl MemoryCache {
    /// Create a cache whose entries never expire
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose entries expire after `ttl`
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Create from config (for registry)
    pub fn from_config(config: &MemoryCacheConfig) -> Self {
        match config.ttl_ms {
            0 => Self::new(),
            ms => Self::with_ttl(Duration::from_millis(ms)),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.values().filter(|e| e.is_live(now)).count()
    }

    /// Whether no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry now, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut items, now, true)
    }

    /// Drop expired entries if a sweep is due; caller holds the write lock
    fn sweep(&self, items: &mut HashMap<String, Entry>, now: Instant, force: bool) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let mut next = self.next_sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if !force && next.is_some_and(|at| now < at) {
            return 0;
        }
        *next = Some(now + ttl);

        let before = items.len();
        items.retain(|_, entry| entry.is_live(now));
        let removed = before - items.len();
        if removed > 0 {
            debug!(removed, remaining = items.len(), "expired cache entries swept");
        }
        removed
    }

    fn entry(&self, value: Bytes) -> Entry {
        Entry {
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        match items.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(entry.value.clone()),
            _ => Err(CacheError::NotFound),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), CacheError> {
        let entry = self.entry(value);
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut items, Instant::now(), false);
        items.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_multi(&self, values: HashMap<String, Bytes>) -> Result<(), CacheError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut items, Instant::now(), false);
        for (key, value) in values {
            let entry = self.entry(value);
            items.insert(key, entry);
        }
        Ok(())
    }

    async fn add(&self, key: &str, value: Bytes) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut items, now, false);
        if items.get(key).is_some_and(|e| e.is_live(now)) {
            return Err(CacheError::AlreadyExists);
        }
        items.insert(key.to_string(), self.entry(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}
