//! Operation History
//!
//! The ordered audit trail of a task. Entries are appended, never removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use texpilot_tools::{Operation, OperationResult};

/// One executed operation and its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// 1-based, strictly increasing
    pub sequence_number: u64,
    pub operation: Operation,
    pub result: OperationResult,
    pub timestamp: DateTime<Utc>,
}

/// Append-only list of [`HistoryEntry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationHistory {
    entries: Vec<HistoryEntry>,
}

impl OperationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return it.
    pub fn record(&mut self, operation: Operation, result: OperationResult) -> &HistoryEntry {
        let sequence_number = self.entries.len() as u64 + 1;
        self.entries.push(HistoryEntry {
            sequence_number,
            operation,
            result,
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `limit` entries, oldest first. Display only.
    pub fn tail(&self, limit: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }
}
