//! Error types for the channel.

/// Errors produced by the channel.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
}
