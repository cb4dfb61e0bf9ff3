//! Output error types

use thiserror::Error;

/// Output-specific errors
#[derive(Debug, Error)]
pub enum OutputError {
    /// Writer creation error
    #[error("failed to create writer '{name}': {message}")]
    WriterCreation { name: String, message: String },

    /// Bounded wait for shutdown elapsed with work still in flight
    #[error("output '{name}' did not close within {waited_ms}ms")]
    Timeout { name: String, waited_ms: u64 },

    /// Contract error
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OutputError {
    /// Create a writer creation error
    pub fn writer_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriterCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error reports an incomplete shutdown
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
