//! SubprocessCache - cache whose storage lives in another process

use std::collections::HashMap;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use bytes::Bytes;
use contracts::{Cache, CacheError, ContractError, SubprocessCacheConfig};
use tokio::process::Command;
use tracing::{debug, instrument};

const EXIT_CODE_KEY_NOT_FOUND: i32 = 1;

/// External executable based cache
///
/// Only `get` is backed by the process; mutating operations are no-ops.
#[derive(Debug, Clone)]
pub struct SubprocessCache {
    name: String,
    args: Vec<String>,
}

impl SubprocessCache {
    /// Create a cache invoking `name` with `args` prepended to every call
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Create from config (for registry)
    pub fn from_config(config: &SubprocessCacheConfig) -> Result<Self, ContractError> {
        if config.name.is_empty() {
            return Err(ContractError::config_validation(
                "subprocess.name",
                "subprocess cache requires a command name",
            ));
        }
        Ok(Self::new(&config.name, config.args.clone()))
    }

    async fn run(&self, operation: &str, key: &str) -> Result<Output, CacheError> {
        Command::new(&self.name)
            .args(&self.args)
            .arg(operation)
            .arg(key)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CacheError::Other(format!("failed to run '{}': {e}", self.name)))
    }
}

#[async_trait]
impl Cache for SubprocessCache {
    /// Exit code 1 signals a missing key, keeping it distinct from a cached
    /// empty value. Any other non-zero exit is an unknown error state.
    #[instrument(name = "subprocess_cache_get", skip(self), fields(command = %self.name))]
    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        let output = self.run("get", key).await?;

        match output.status.code() {
            Some(0) => Ok(Bytes::from(output.stdout)),
            Some(EXIT_CODE_KEY_NOT_FOUND) => Err(CacheError::NotFound),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                debug!(?code, stderr = %stderr, "cache process failed");
                Err(CacheError::Subprocess { code, stderr })
            }
        }
    }

    async fn set(&self, _key: &str, _value: Bytes) -> Result<(), CacheError> {
        Ok(())
    }

    async fn set_multi(&self, _items: HashMap<String, Bytes>) -> Result<(), CacheError> {
        Ok(())
    }

    async fn add(&self, _key: &str, _value: Bytes) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
