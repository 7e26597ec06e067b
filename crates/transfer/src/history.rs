//! Transfer history collaborator.
//!
//! Append-only, capped at the most recent entries, keyed by transfer id.
//! Client-side only; removal discards the entry with no retention.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use roomdrop_protocol::Direction;

/// Maximum retained history entries.
pub const HISTORY_CAP: usize = 50;

/// One completed transfer in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub transfer_id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub direction: Direction,
    pub annotation: String,
}

/// Append-only history store, capped at [`HISTORY_CAP`] entries.
pub trait HistoryStore: Send + Sync {
    /// Appends an entry, evicting the oldest beyond the cap.
    fn append(&self, entry: HistoryEntry);

    /// Returns entries, most recent first.
    fn entries(&self) -> Vec<HistoryEntry>;

    /// Discards the entry for a transfer id, if present.
    fn remove(&self, transfer_id: Uuid);
}

/// In-memory history store.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistory {
    fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock().unwrap();
        entries.push_front(entry);
        entries.truncate(HISTORY_CAP);
    }

    fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    fn remove(&self, transfer_id: Uuid) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.transfer_id != transfer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> HistoryEntry {
        HistoryEntry {
            transfer_id: Uuid::new_v4(),
            name: name.into(),
            mime_type: "text/plain".into(),
            size: 10,
            direction: Direction::Inbound,
            annotation: String::new(),
        }
    }

    #[test]
    fn most_recent_first() {
        let history = InMemoryHistory::new();
        history.append(entry("first"));
        history.append(entry("second"));
        let entries = history.entries();
        assert_eq!(entries[0].name, "second");
        assert_eq!(entries[1].name, "first");
    }

    #[test]
    fn capped_at_fifty() {
        let history = InMemoryHistory::new();
        for i in 0..60 {
            history.append(entry(&format!("file-{i}")));
        }
        let entries = history.entries();
        assert_eq!(entries.len(), HISTORY_CAP);
        // The oldest ten were evicted.
        assert_eq!(entries.last().unwrap().name, "file-10");
        assert_eq!(entries.first().unwrap().name, "file-59");
    }

    #[test]
    fn remove_discards_by_id() {
        let history = InMemoryHistory::new();
        let kept = entry("kept");
        let dropped = entry("dropped");
        history.append(kept.clone());
        history.append(dropped.clone());

        history.remove(dropped.transfer_id);
        let entries = history.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transfer_id, kept.transfer_id);
    }
}
