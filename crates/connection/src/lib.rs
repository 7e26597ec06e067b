//! Connection coordination for Roomdrop endpoints.
//!
//! The [`Coordinator`] turns signaling exchange over a room bus into an
//! open bidirectional channel. One endpoint creates the room (Initiator),
//! the other joins it (Responder); the initiator alone produces the
//! offer, the responder the answer, and network-discovery candidates flow
//! both ways until the transport connects. Alongside the automatic broker
//! path, the local session descriptor can be exported to and imported
//! from an opaque copy/paste token.

mod coordinator;
mod error;
mod types;

pub use coordinator::Coordinator;
pub use error::{ConnectionError, NegotiationError};
pub use types::{ConnectionEvent, ConnectionState, CoordinatorConfig};
