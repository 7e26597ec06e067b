//! Control messages multiplexed with binary chunk frames on the channel.
//!
//! Control messages travel as JSON text frames with a `type`
//! discriminator; chunk frames travel as untagged binary (see
//! [`crate::chunk`]). A malformed control frame is the receiver's problem
//! to log and drop — decoding failures are never fatal to the channel.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pause/resume action carried by [`ControlMessage::TransferControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
}

/// A control message on the open channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Announces a transfer before its first chunk. The sender only
    /// enqueues chunks after this send returns, so the receiver always
    /// has the record before any chunk arrives.
    #[serde(rename_all = "camelCase")]
    MetadataAnnounce {
        transfer_id: Uuid,
        name: String,
        total_size: u64,
        mime_type: String,
    },
    /// Advisory pause/resume notice. Updates the receiver's view of the
    /// record's status; it does not stop already-in-flight bytes.
    #[serde(rename_all = "camelCase")]
    TransferControl {
        transfer_id: Uuid,
        action: ControlAction,
    },
}

impl ControlMessage {
    /// Encodes the message as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
