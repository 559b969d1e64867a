//! Bounded dispatch history.
//!
//! Process-wide and in-memory only: entries are appended after every dispatch
//! and the oldest entry is evicted once the log is full.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::channels::ChannelKind;
use super::dispatcher::DispatchResult;
use super::events::{NotificationEvent, Priority, TemplateData};

/// Default number of entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Outcome of one dispatch, as recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub template_name: String,
    pub data: TemplateData,
    pub priority: Priority,
    pub result: DispatchResult,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(event: &NotificationEvent, result: DispatchResult) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            template_name: event.template_name.clone(),
            data: event.data.clone(),
            priority: event.priority,
            timestamp: result.timestamp,
            result,
        }
    }
}

/// Per-channel success/failure counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelCounts {
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate view over the retained entries.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    /// Entries currently retained.
    pub retained: usize,
    /// Entries ever appended, including evicted ones.
    pub total_appended: u64,
    /// Retained entries with at least one successful channel.
    pub delivered: usize,
    pub channels: BTreeMap<ChannelKind, ChannelCounts>,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// Fixed-capacity, FIFO-evicting log of dispatch outcomes.
#[derive(Debug)]
pub struct HistoryLog {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
    total_appended: AtomicU64,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            total_appended: AtomicU64::new(0),
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        self.total_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn summary(&self) -> HistorySummary {
        let entries = self.entries.lock();
        let mut summary = HistorySummary {
            retained: entries.len(),
            total_appended: self.total_appended.load(Ordering::Relaxed),
            last_dispatch_at: entries.back().map(|e| e.timestamp),
            ..Default::default()
        };
        for entry in entries.iter() {
            if entry.result.delivered() {
                summary.delivered += 1;
            }
            for channel in &entry.result.succeeded {
                summary.channels.entry(*channel).or_default().succeeded += 1;
            }
            for channel in &entry.result.failed {
                summary.channels.entry(*channel).or_default().failed += 1;
            }
        }
        summary
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}
