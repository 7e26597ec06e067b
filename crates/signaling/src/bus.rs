//! The two-slot room bus and its participant handles.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use roomdrop_channel::Rendezvous;
use roomdrop_protocol::{Role, SignalingEnvelope};

use crate::error::SignalingError;

struct BusInner {
    /// Envelope inbox senders, indexed by role.
    slots: StdMutex<[Option<mpsc::UnboundedSender<SignalingEnvelope>>; 2]>,
    rendezvous: Arc<Rendezvous>,
}

fn slot_index(role: Role) -> usize {
    match role {
        Role::Initiator => 0,
        Role::Responder => 1,
    }
}

/// The signaling bus for one room.
///
/// Cheap to clone; all clones share the same two participant slots and
/// the same channel rendezvous. Create one per room and hand it to both
/// endpoints' coordinators.
#[derive(Clone)]
pub struct RoomBus {
    inner: Arc<BusInner>,
}

impl RoomBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                slots: StdMutex::new([None, None]),
                rendezvous: Arc::new(Rendezvous::new()),
            }),
        }
    }

    /// Attaches a participant with the given role.
    ///
    /// At most one participant per role; a second attach for an occupied
    /// role fails with [`SignalingError::RoleTaken`], or
    /// [`SignalingError::RoomFull`] when both slots are taken. The
    /// returned handle is the exclusive receiver for that role; dropping
    /// it frees the slot.
    pub fn attach(&self, role: Role) -> Result<BusHandle, SignalingError> {
        let occupied = |slot: &Option<mpsc::UnboundedSender<SignalingEnvelope>>| {
            slot.as_ref().is_some_and(|s| !s.is_closed())
        };
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut slots = self.inner.slots.lock().unwrap();
            if occupied(&slots[slot_index(role)]) {
                return Err(if occupied(&slots[slot_index(role.peer())]) {
                    SignalingError::RoomFull
                } else {
                    SignalingError::RoleTaken(role)
                });
            }
            slots[slot_index(role)] = Some(tx);
        }
        debug!(?role, "participant attached to room bus");
        Ok(BusHandle {
            role,
            inner: Arc::clone(&self.inner),
            rx: Mutex::new(rx),
        })
    }

    /// The channel rendezvous hosted by this room.
    pub fn rendezvous(&self) -> Arc<Rendezvous> {
        Arc::clone(&self.inner.rendezvous)
    }
}

impl Default for RoomBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's handle on the room bus.
///
/// Holds the exclusive receive side for its role; same-direction
/// envelopes are delivered in send order.
pub struct BusHandle {
    role: Role,
    inner: Arc<BusInner>,
    rx: Mutex<mpsc::UnboundedReceiver<SignalingEnvelope>>,
}

impl BusHandle {
    /// This participant's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Best-effort delivery to the other room participant.
    pub fn broadcast(&self, envelope: SignalingEnvelope) -> Result<(), SignalingError> {
        let peer = slot_index(self.role.peer());
        let tx = {
            let slots = self.inner.slots.lock().unwrap();
            slots[peer].clone()
        };
        match tx {
            Some(tx) => tx.send(envelope).map_err(|_| {
                warn!(role = ?self.role, "peer detached mid-broadcast");
                SignalingError::PeerGone
            }),
            None => Err(SignalingError::NoPeer),
        }
    }

    /// Receives the next envelope addressed to this participant.
    ///
    /// The handle is the room-lifetime exclusive receiver for its role;
    /// callers serialize on an internal lock.
    pub async fn recv(&self) -> Option<SignalingEnvelope> {
        self.rx.lock().await.recv().await
    }
}

impl Drop for BusHandle {
    fn drop(&mut self) {
        let mut slots = self.inner.slots.lock().unwrap();
        slots[slot_index(self.role)] = None;
        debug!(role = ?self.role, "participant detached from room bus");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn announce() -> SignalingEnvelope {
        SignalingEnvelope::Announce {
            session_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_the_other_participant() {
        let bus = RoomBus::new();
        let initiator = bus.attach(Role::Initiator).unwrap();
        let responder = bus.attach(Role::Responder).unwrap();

        let env = announce();
        initiator.broadcast(env.clone()).unwrap();
        assert_eq!(responder.recv().await.unwrap(), env);
    }

    #[tokio::test]
    async fn same_direction_envelopes_keep_order() {
        let bus = RoomBus::new();
        let initiator = bus.attach(Role::Initiator).unwrap();
        let responder = bus.attach(Role::Responder).unwrap();

        let envs: Vec<_> = (0..5).map(|_| announce()).collect();
        for env in &envs {
            initiator.broadcast(env.clone()).unwrap();
        }
        for env in &envs {
            assert_eq!(responder.recv().await.as_ref(), Some(env));
        }
    }

    #[tokio::test]
    async fn duplicate_role_rejected() {
        let bus = RoomBus::new();
        let _first = bus.attach(Role::Initiator).unwrap();
        assert!(matches!(
            bus.attach(Role::Initiator),
            Err(SignalingError::RoleTaken(Role::Initiator))
        ));
    }

    #[tokio::test]
    async fn at_most_two_endpoints_per_room() {
        let bus = RoomBus::new();
        let _a = bus.attach(Role::Initiator).unwrap();
        let _b = bus.attach(Role::Responder).unwrap();
        assert!(matches!(
            bus.attach(Role::Initiator),
            Err(SignalingError::RoomFull)
        ));
        assert!(matches!(
            bus.attach(Role::Responder),
            Err(SignalingError::RoomFull)
        ));
    }

    #[tokio::test]
    async fn broadcast_without_peer_fails() {
        let bus = RoomBus::new();
        let initiator = bus.attach(Role::Initiator).unwrap();
        assert_eq!(
            initiator.broadcast(announce()).unwrap_err(),
            SignalingError::NoPeer
        );
    }

    #[tokio::test]
    async fn detach_frees_the_slot() {
        let bus = RoomBus::new();
        let handle = bus.attach(Role::Responder).unwrap();
        drop(handle);
        // The slot is reusable after detach.
        assert!(bus.attach(Role::Responder).is_ok());
    }

    #[tokio::test]
    async fn clones_share_slots() {
        let bus = RoomBus::new();
        let bus2 = bus.clone();
        let initiator = bus.attach(Role::Initiator).unwrap();
        let responder = bus2.attach(Role::Responder).unwrap();

        let env = announce();
        initiator.broadcast(env.clone()).unwrap();
        assert_eq!(responder.recv().await.unwrap(), env);
    }
}
