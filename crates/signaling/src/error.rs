//! Error types for the signaling bus.

use roomdrop_protocol::Role;

/// Errors produced by the signaling bus.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("role {0:?} is already attached to this room")]
    RoleTaken(Role),

    #[error("room already has two participants")]
    RoomFull,

    #[error("no peer is attached to receive the envelope")]
    NoPeer,

    #[error("peer detached; envelope undeliverable")]
    PeerGone,
}
