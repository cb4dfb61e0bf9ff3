//! MessagePart / Batch - the unit of data moved through a stream
//!
//! Parts are values: every transformation produces a new part, the batch
//! keeps insertion order from input to output.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error annotation attached to a part by the stage that failed on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartError {
    /// Kind of failure, usually the name of the failing processor
    pub kind: String,
    /// Human readable reason
    pub message: String,
}

impl PartError {
    /// Create a new part error
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A single message: payload, string metadata and an optional failure annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    payload: Bytes,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    error: Option<PartError>,
}

impl MessagePart {
    /// Create a part with the given payload and no metadata
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            metadata: BTreeMap::new(),
            error: None,
        }
    }

    /// Payload bytes (cheap clone)
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Metadata map
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Look up a single metadata value
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Failure annotation, if a stage failed on this part
    pub fn error(&self) -> Option<&PartError> {
        self.error.as_ref()
    }

    /// Whether the part currently carries a failure annotation
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Produce a part with a replaced payload
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Produce a part with an added (or replaced) metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Produce a part marked as failed
    pub fn with_error(mut self, error: PartError) -> Self {
        self.error = Some(error);
        self
    }

    /// Produce a part with the failure annotation removed
    pub fn clear_error(mut self) -> Self {
        self.error = None;
        self
    }
}

/// Ordered sequence of parts delivered together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    parts: Vec<MessagePart>,
}

impl Batch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from raw payloads, one part each
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        payloads.into_iter().map(MessagePart::new).collect()
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the batch holds no parts
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sum of payload sizes
    pub fn byte_size(&self) -> usize {
        self.parts.iter().map(MessagePart::len).sum()
    }

    /// Iterate parts in order
    pub fn iter(&self) -> std::slice::Iter<'_, MessagePart> {
        self.parts.iter()
    }

    /// Part at the given position
    pub fn get(&self, index: usize) -> Option<&MessagePart> {
        self.parts.get(index)
    }

    /// Append a part at the end
    pub fn push(&mut self, part: MessagePart) {
        self.parts.push(part);
    }

    /// Move all parts of `other` to the end of this batch
    pub fn append(&mut self, other: Batch) {
        self.parts.extend(other.parts);
    }

    /// Number of parts carrying a failure annotation
    pub fn failed_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_failed()).count()
    }

    /// First failure annotation in batch order
    pub fn first_failure(&self) -> Option<&PartError> {
        self.parts.iter().find_map(MessagePart::error)
    }

    /// Consume the batch, yielding its parts
    pub fn into_parts(self) -> Vec<MessagePart> {
        self.parts
    }
}

impl From<Vec<MessagePart>> for Batch {
    fn from(parts: Vec<MessagePart>) -> Self {
        Self { parts }
    }
}

impl FromIterator<MessagePart> for Batch {
    fn from_iter<T: IntoIterator<Item = MessagePart>>(iter: T) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

impl Extend<MessagePart> for Batch {
    fn extend<T: IntoIterator<Item = MessagePart>>(&mut self, iter: T) {
        self.parts.extend(iter);
    }
}

impl IntoIterator for Batch {
    type Item = MessagePart;
    type IntoIter = std::vec::IntoIter<MessagePart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a MessagePart;
    type IntoIter = std::slice::Iter<'a, MessagePart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}
