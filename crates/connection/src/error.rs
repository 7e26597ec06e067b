//! Error types for connection negotiation.

use roomdrop_protocol::{DescriptorKind, RoomCodeError, TokenError};
use roomdrop_signaling::SignalingError;

/// Errors produced while negotiating the connection.
///
/// These surface to the caller (or the event stream) without changing the
/// coordinator's state, except for [`TimedOut`](NegotiationError::TimedOut)
/// and [`Closed`](NegotiationError::Closed).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("unexpected {got:?} descriptor (expected {expected:?})")]
    UnexpectedDescriptor {
        expected: DescriptorKind,
        got: DescriptorKind,
    },

    #[error("remote description already applied")]
    AlreadyApplied,

    #[error("no local session descriptor available yet")]
    NoLocalDescriptor,

    #[error("candidate rejected: {0}")]
    BadCandidate(String),

    #[error("negotiation timed out before the channel opened")]
    TimedOut,

    #[error("coordinator is closed")]
    Closed,
}

/// Top-level error type of the connection crate.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Room(#[from] RoomCodeError),
}
