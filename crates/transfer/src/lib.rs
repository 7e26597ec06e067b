//! Chunked payload transfer over an open Roomdrop channel.
//!
//! The sender slices a payload into 16 KiB chunks, paces transmission
//! against the channel's buffered amount (2 MiB high water mark), and
//! supports pause/resume/cancel with progress events. The receiver
//! reassembles chunks into complete payloads via per-transfer keyed
//! buffers and hands completed payloads to the insight lookup and
//! history collaborators.

mod events;
mod history;
mod insight;
mod receiver;
mod sender;

pub use events::TransferEvent;
pub use history::{HISTORY_CAP, HistoryEntry, HistoryStore, InMemoryHistory};
pub use insight::{FALLBACK_ANNOTATION, FallbackInsight, InsightLookup};
pub use receiver::TransferReceiver;
pub use sender::{SenderConfig, TransferSender};

use uuid::Uuid;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("channel lost before the transfer finished")]
    ConnectionLost,

    #[error("transfer {0} already has an active send loop")]
    AlreadyActive(Uuid),

    #[error("unknown transfer {0}")]
    UnknownTransfer(Uuid),

    #[error("transfer {0} aborted")]
    Aborted(Uuid),

    #[error("control frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
