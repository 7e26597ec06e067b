//! Transfer records and their lifecycle vocabulary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a transfer relative to the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Lifecycle status of a transfer record.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
}

impl TransferStatus {
    /// `true` for terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

/// One transfer's bookkeeping on an endpoint.
///
/// Created at send-start (outbound) or on metadata-announce receipt
/// (inbound); mutated by progress events; discarded on user removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: Uuid,
    pub name: String,
    pub total_size: u64,
    pub mime_type: String,
    pub direction: Direction,
    /// Sent bytes (outbound) or received bytes (inbound). Never exceeds
    /// `total_size`; equality means completion.
    pub offset: u64,
    pub status: TransferStatus,
    pub progress_percent: f64,
}

impl TransferRecord {
    /// Creates a fresh pending record with zero progress.
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        total_size: u64,
        mime_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            total_size,
            mime_type: mime_type.into(),
            direction,
            offset: 0,
            status: TransferStatus::Pending,
            progress_percent: 0.0,
        }
    }

    /// Advances the offset and recomputes progress.
    ///
    /// Progress is `min(100, offset / total_size * 100)`; an empty payload
    /// is complete at 100 immediately.
    pub fn advance(&mut self, bytes: u64) {
        self.offset = (self.offset + bytes).min(self.total_size);
        self.progress_percent = self.progress();
    }

    /// Current progress percentage, clamped to `[0, 100]`.
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        (self.offset as f64 / self.total_size as f64 * 100.0).min(100.0)
    }

    /// `true` once every byte is accounted for.
    pub fn is_complete(&self) -> bool {
        self.offset == self.total_size
    }
}
