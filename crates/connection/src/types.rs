//! Public types for the coordinator.

use std::time::Duration;

use roomdrop_channel::DEFAULT_LOW_WATER;

/// Connection state of an endpoint's coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing created or joined yet.
    Idle,
    /// Room exists locally; waiting for the other participant.
    AwaitingPeer,
    /// Offer/answer/candidate exchange in progress.
    Negotiating,
    /// Channel connected and usable.
    Open,
    /// Channel lost after having been open; retry-eligible.
    Degraded,
    /// Torn down, explicitly or after an irrecoverable failure.
    Closed,
}

impl ConnectionState {
    /// `true` only while the channel can carry transfers.
    pub fn is_usable(self) -> bool {
        self == ConnectionState::Open
    }

    /// Human-readable state description for status displays.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::AwaitingPeer => "waiting for peer",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Open => "connected",
            ConnectionState::Degraded => "connection degraded",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Events emitted by the coordinator.
///
/// Delivered on an ordered stream: the `StateChanged` for a transition is
/// queued before any event caused by that transition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection state changed. `usable` is `true` only for
    /// [`ConnectionState::Open`].
    StateChanged {
        state: ConnectionState,
        usable: bool,
        label: &'static str,
    },
    /// A negotiation step was rejected; the coordinator kept its state.
    NegotiationFailed { error: String },
}

/// Tunables for a coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Bound on the whole negotiation: if `Open` is not reached within
    /// this interval of creating/joining the room, the coordinator fails
    /// to `Closed`.
    pub negotiation_timeout: Duration,
    /// Bound on failed candidate applications before the coordinator
    /// gives up and closes.
    pub max_candidate_retries: u32,
    /// Low water mark handed to the channel opened by this endpoint.
    pub low_water: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(30),
            max_candidate_retries: 8,
            low_water: DEFAULT_LOW_WATER,
        }
    }
}
