//! Layered error definitions
//!
//! Categorized by concern: config / write / cache / delivery

use thiserror::Error;

/// Unified error type for configuration and lifecycle failures
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Unknown component type requested from a registry
    #[error("{kind} type '{name}' was not recognised")]
    UnknownType { kind: &'static str, name: String },

    // ===== Lifecycle Errors =====
    /// A bounded wait did not complete in time; outcome unknown
    #[error("timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create unknown type error
    pub fn unknown_type(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownType {
            kind,
            name: name.into(),
        }
    }
}

/// Failure reported by a writer's `connect` or `write`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    /// Transient downstream condition, the same batch may be retried
    #[error("retryable: {0}")]
    Retryable(String),

    /// Downstream link dropped, reconnect before retrying
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Non-recoverable, do not retry
    #[error("fatal: {0}")]
    Fatal(String),
}

impl WriteError {
    /// Create retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    /// Create connection lost error
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    /// Create fatal error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Whether a retry may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

/// Failure reported by a cache operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Key is absent (distinct from a stored empty value)
    #[error("key does not exist")]
    NotFound,

    /// Exclusive insert hit an existing key
    #[error("key already exists")]
    AlreadyExists,

    /// External cache process exited with an unhandled status
    #[error("cache process exited with {code:?}: {stderr}")]
    Subprocess { code: Option<i32>, stderr: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Reason carried by a negative acknowledgment
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Batch still held failed parts when it reached the output
    #[error("{failed} part(s) failed processing, first: {first}")]
    FailedParts { failed: usize, first: String },

    /// Downstream write failed after retries
    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    /// Work rejected because the component is closing
    #[error("shutdown in progress")]
    ShutdownInProgress,

    /// Ack obligation was dropped without a result
    #[error("failed to receive acknowledgement")]
    AckDropped,
}
