//! BatchPolicy - accumulates transactions until a trigger fires
//!
//! Triggers are OR-ed: part count, byte size, age of the oldest buffered
//! transaction. A flush merges every buffered batch in arrival order and
//! fans the downstream ack out to each contributor.

use std::time::Duration;

use contracts::{AckHandle, Batch, BatchPolicyConfig, Transaction};
use tokio::time::Instant;

/// Accumulator state for one output
#[derive(Debug)]
pub struct BatchPolicy {
    count: usize,
    byte_size: usize,
    period: Option<Duration>,
    pending: Vec<(Batch, AckHandle)>,
    parts: usize,
    bytes: usize,
    oldest: Option<Instant>,
}

impl BatchPolicy {
    /// Create a policy from its trigger configuration
    pub fn new(config: BatchPolicyConfig) -> Self {
        Self {
            count: config.count,
            byte_size: config.byte_size,
            period: config.period(),
            pending: Vec::new(),
            parts: 0,
            bytes: 0,
            oldest: None,
        }
    }

    /// A policy without triggers flushes every transaction on its own
    pub fn is_noop(&self) -> bool {
        self.count == 0 && self.byte_size == 0 && self.period.is_none()
    }

    /// Buffer a transaction; returns `true` when a flush is due
    pub fn add(&mut self, transaction: Transaction) -> bool {
        let (batch, ack) = transaction.into_parts();
        self.parts += batch.len();
        self.bytes += batch.byte_size();
        self.oldest.get_or_insert_with(Instant::now);
        self.pending.push((batch, ack));
        self.is_ready()
    }

    /// Whether any trigger currently holds
    pub fn is_ready(&self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        if self.is_noop() {
            return true;
        }
        (self.count > 0 && self.parts >= self.count)
            || (self.byte_size > 0 && self.bytes >= self.byte_size)
            || self.deadline().is_some_and(|d| Instant::now() >= d)
    }

    /// When the period trigger fires for the current buffer
    pub fn deadline(&self) -> Option<Instant> {
        Some(self.oldest? + self.period?)
    }

    /// Buffered transaction count
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffered part count
    pub fn part_count(&self) -> usize {
        self.parts
    }

    /// Buffered payload bytes
    pub fn byte_count(&self) -> usize {
        self.bytes
    }

    /// Drain the buffer into one transaction; `None` when empty
    pub fn flush(&mut self) -> Option<Transaction> {
        if self.pending.is_empty() {
            return None;
        }
        self.parts = 0;
        self.bytes = 0;
        self.oldest = None;

        let mut pending = std::mem::take(&mut self.pending);
        if pending.len() == 1 {
            let (batch, ack) = pending.remove(0);
            return Some(Transaction::from_parts(batch, ack));
        }

        let mut merged = Batch::new();
        let mut acks = Vec::with_capacity(pending.len());
        for (batch, ack) in pending {
            merged.append(batch);
            acks.push(ack);
        }
        Some(Transaction::from_parts(merged, AckHandle::merge(acks)))
    }
}
