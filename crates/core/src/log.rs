//! Append-only narrative log of a generation cycle.
//!
//! Lines come from the stream channel only. They are kept in arrival
//! order and repeated deliveries are kept as-is.

use serde::Serialize;

use crate::types::Timestamp;

/// One line of job narrative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub message: String,
    /// When this client received the line.
    pub observed_at: Timestamp,
    /// Raw timestamp string the backend attached, if any.
    pub reported_at: Option<String>,
}

/// Ordered, unbounded sequence of [`LogEntry`] values.
#[derive(Debug, Clone, Default)]
pub struct LogAccumulator {
    entries: Vec<LogEntry>,
}

impl LogAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line. Empty messages are skipped; nothing else is
    /// filtered.
    pub fn push(&mut self, entry: LogEntry) -> bool {
        if entry.message.is_empty() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
