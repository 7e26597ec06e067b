//! Ordered, reliable, message-oriented channel for Roomdrop endpoints.
//!
//! The channel is the post-negotiation transport: text frames carry
//! control messages, binary frames carry chunks, and frames sent by one
//! endpoint arrive at the other in emission order. The channel reports
//! its outbound buffered amount and emits a "drained" event when
//! buffering falls below a configurable low water mark, which is what the
//! sender paces against.
//!
//! [`Rendezvous`] mates the two halves of an in-memory channel pair
//! during negotiation; the first endpoint to open parks its peer's half
//! and both sides observe "connected" once the second endpoint opens.

mod channel;
mod error;
mod frame;
mod rendezvous;

pub use channel::Channel;
pub use error::ChannelError;
pub use frame::Frame;
pub use rendezvous::Rendezvous;

/// Default low water mark: 1 MiB. Strictly below the sender's 2 MiB high
/// water mark; the drained event fires when outbound buffering falls to
/// or below this.
pub const DEFAULT_LOW_WATER: u64 = 1024 * 1024;
