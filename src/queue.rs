//! Output event queue
//!
//! Trackers publish into an [`EventSink`]. [`DataLayer`] is the default sink:
//! an append-only list of JSON entries, the shape tag managers consume.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::types::EngagementRecord;

/// Append-only destination for classification records.
///
/// Implementations must not block and must not report failures to the caller.
pub trait EventSink {
    fn push(&self, record: &EngagementRecord);
}

/// Shared handle to an append-only event queue.
///
/// Clones share the same underlying entries, so the host keeps one handle
/// while the tracker publishes through another.
#[derive(Debug, Clone, Default)]
pub struct DataLayer {
    entries: Arc<Mutex<Vec<Value>>>,
}

impl DataLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arbitrary entry, as other page scripts would
    pub fn push_value(&self, value: Value) {
        self.lock().push(value);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every entry, in publish order
    pub fn entries(&self) -> Vec<Value> {
        self.lock().clone()
    }

    /// Remove and return every entry
    pub fn drain(&self) -> Vec<Value> {
        std::mem::take(&mut *self.lock())
    }

    /// Entries that are classification records
    pub fn records(&self) -> Vec<EngagementRecord> {
        self.lock()
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        // Entries are plain values; a panic elsewhere cannot leave them half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for DataLayer {
    fn push(&self, record: &EngagementRecord) {
        match serde_json::to_value(record) {
            Ok(value) => self.push_value(value),
            Err(e) => log::error!(target: "reader_tracker", "failed to encode record: {}", e),
        }
    }
}
