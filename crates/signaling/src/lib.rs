//! Per-room signaling bus.
//!
//! A [`RoomBus`] is created per room instance and injected into each
//! coordinator — there is no process-wide registry. It holds exactly two
//! participant slots (one per role), delivers small envelopes
//! best-effort between them with same-direction ordering, and hosts the
//! channel rendezvous used to mate the two transport halves during
//! negotiation.

mod bus;
mod error;

pub use bus::{BusHandle, RoomBus};
pub use error::SignalingError;
