//! LogWriter - logs batch contents via tracing

use contracts::{Batch, WriteError, Writer};
use tracing::{info, instrument};

/// Writer that logs every part, for debugging
pub struct LogWriter {
    name: String,
}

impl LogWriter {
    /// Create a new LogWriter with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Writer for LogWriter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), WriteError> {
        Ok(())
    }

    #[instrument(
        name = "log_writer_write",
        skip(self, batch),
        fields(writer = %self.name, parts = batch.len())
    )]
    async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
        for (index, part) in batch.iter().enumerate() {
            info!(
                index,
                payload = %String::from_utf8_lossy(part.payload()),
                metadata = ?part.metadata(),
                "message part"
            );
        }
        Ok(())
    }

    #[instrument(name = "log_writer_close", skip(self))]
    async fn close(&self) -> Result<(), WriteError> {
        info!(writer = %self.name, "LogWriter closed");
        Ok(())
    }
}
