//! Cache trait - key/value capability shared by processors
//!
//! Implementations are shared behind `Arc<dyn Cache>` and must be safe for
//! concurrent calls. Operations a backend cannot support are explicit no-ops.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::CacheError;

/// Key/value cache capability
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value; `CacheError::NotFound` when the key is absent
    async fn get(&self, key: &str) -> Result<Bytes, CacheError>;

    /// Store a value, overwriting any existing one
    async fn set(&self, key: &str, value: Bytes) -> Result<(), CacheError>;

    /// Store several values
    async fn set_multi(&self, items: HashMap<String, Bytes>) -> Result<(), CacheError>;

    /// Store a value only if the key is absent; `CacheError::AlreadyExists` otherwise
    async fn add(&self, key: &str, value: Bytes) -> Result<(), CacheError>;

    /// Remove a key
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
