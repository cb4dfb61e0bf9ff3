//! BatchSource - where input batches come from

use std::collections::VecDeque;

use async_trait::async_trait;
use contracts::Batch;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::error::{IngestionError, Result};

/// A source of batches; `Ok(None)` means exhausted
#[async_trait]
pub trait BatchSource: Send {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Read the next batch
    async fn next_batch(&mut self) -> Result<Option<Batch>>;
}

/// Source replaying a fixed list of batches
#[derive(Debug, Default)]
pub struct StaticSource {
    batches: VecDeque<Batch>,
}

impl StaticSource {
    pub fn new(batches: impl IntoIterator<Item = Batch>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
        }
    }

    /// One single-part batch per payload
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<bytes::Bytes>,
    {
        Self::new(payloads.into_iter().map(|p| Batch::from_payloads([p])))
    }
}

#[async_trait]
impl BatchSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        Ok(self.batches.pop_front())
    }
}

/// Source reading newline-delimited payloads, `batch_lines` parts per batch
///
/// Empty lines are skipped. The final batch may be shorter.
pub struct LineSource<R> {
    name: String,
    lines: Lines<R>,
    batch_lines: usize,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(name: impl Into<String>, reader: R, batch_lines: usize) -> Self {
        Self {
            name: name.into(),
            lines: reader.lines(),
            batch_lines: batch_lines.max(1),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> BatchSource for LineSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        let mut batch = Batch::new();
        while batch.len() < self.batch_lines {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| IngestionError::read_failed(&self.name, e.to_string()))?;
            match line {
                Some(line) if line.is_empty() => continue,
                Some(line) => batch.push(contracts::MessagePart::new(line)),
                None => break,
            }
        }
        Ok((!batch.is_empty()).then_some(batch))
    }
}
