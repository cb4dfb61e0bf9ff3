//! FileWriter - appends newline-delimited payloads to a file

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use contracts::{Batch, WriteError, Writer};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::OutputError;

/// Configuration for FileWriter
#[derive(Debug, Clone)]
pub struct FileWriterConfig {
    /// Target file, created on connect and appended to
    pub path: PathBuf,
}

impl FileWriterConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        params.get("path").map(|path| Self {
            path: PathBuf::from(path),
        })
    }
}

/// Writer appending one line per part
///
/// Each batch is flushed before its write returns, so a successful write
/// means the parts reached the file.
pub struct FileWriter {
    name: String,
    config: FileWriterConfig,
    file: Mutex<Option<BufWriter<File>>>,
}

impl FileWriter {
    /// Create a new FileWriter; the file is opened on `connect`
    pub fn new(name: impl Into<String>, config: FileWriterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            file: Mutex::new(None),
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, OutputError> {
        let name = name.into();
        let config = FileWriterConfig::from_params(params)
            .ok_or_else(|| OutputError::writer_creation(&name, "missing 'path' parameter"))?;
        Ok(Self::new(name, config))
    }
}

fn classify(error: std::io::Error) -> WriteError {
    match error.kind() {
        ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
            WriteError::fatal(error.to_string())
        }
        _ => WriteError::retryable(error.to_string()),
    }
}

impl Writer for FileWriter {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_writer_connect", skip(self), fields(path = %self.config.path.display()))]
    async fn connect(&self) -> Result<(), WriteError> {
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(classify)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await
            .map_err(classify)?;
        *self.file.lock().await = Some(BufWriter::new(file));
        debug!("file opened");
        Ok(())
    }

    #[instrument(
        name = "file_writer_write",
        skip(self, batch),
        fields(writer = %self.name, parts = batch.len())
    )]
    async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return Err(WriteError::connection_lost("file is not open"));
        };
        for part in batch {
            file.write_all(part.payload()).await.map_err(classify)?;
            file.write_all(b"\n").await.map_err(classify)?;
        }
        file.flush().await.map_err(classify)
    }

    #[instrument(name = "file_writer_close", skip(self))]
    async fn close(&self) -> Result<(), WriteError> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await.map_err(classify)?;
            file.shutdown().await.map_err(classify)?;
        }
        Ok(())
    }
}
