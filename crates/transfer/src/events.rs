//! Typed transfer events.

use roomdrop_protocol::{TransferRecord, TransferStatus};
use uuid::Uuid;

/// Events emitted by the sender and receiver halves.
///
/// Delivered on an ordered stream; for any one transfer id the offsets
/// in `Progress` events are non-decreasing.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// A record was created (send-start or metadata-announce receipt).
    Created { record: TransferRecord },
    /// Bytes moved; `percent` is clamped to `[0, 100]`.
    Progress { id: Uuid, offset: u64, percent: f64 },
    /// The record's status changed.
    StatusChanged { id: Uuid, status: TransferStatus },
    /// All bytes are accounted for.
    Completed { id: Uuid },
    /// The transfer failed; the record is terminal.
    Failed { id: Uuid, error: String },
    /// The insight lookup produced an annotation for a completed
    /// transfer.
    Insight { id: Uuid, annotation: String },
}
