//! The connection coordinator state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use roomdrop_channel::{Channel, Rendezvous};
use roomdrop_protocol::{
    Candidate, DescriptorKind, Role, RoomCode, SessionDescriptor, SignalingEnvelope, decode_token,
    encode_token,
};
use roomdrop_signaling::{BusHandle, RoomBus, SignalingError};

use crate::error::{ConnectionError, NegotiationError};
use crate::types::{ConnectionEvent, ConnectionState, CoordinatorConfig};

/// Negotiation bookkeeping, guarded by one lock.
struct Negotiation {
    local: Option<SessionDescriptor>,
    remote: Option<SessionDescriptor>,
    /// Candidates that arrived before the remote description; replayed
    /// once it is applied, never dropped.
    pending_candidates: Vec<Candidate>,
    accepted_candidates: u32,
    candidate_failures: u32,
    /// Whether this endpoint has started opening its channel half.
    open_started: bool,
}

struct Shared {
    role: Role,
    config: CoordinatorConfig,
    handle: Arc<BusHandle>,
    rendezvous: Arc<Rendezvous>,
    state: StdMutex<ConnectionState>,
    /// Set once the channel has connected; disarms the negotiation
    /// timeout even if the connection later degrades.
    opened: AtomicBool,
    channel: StdMutex<Option<Arc<Channel>>>,
    negotiation: Mutex<Negotiation>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    cancel: CancellationToken,
}

/// State machine turning signaling exchange into an open channel.
///
/// One coordinator instance per room per endpoint. Every state transition
/// is published as a [`ConnectionEvent::StateChanged`] carrying the
/// usable flag and a human-readable label.
pub struct Coordinator {
    room: RoomCode,
    shared: Arc<Shared>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
}

impl Coordinator {
    /// Creates a room as the Initiator with default configuration.
    ///
    /// Generates the room code, moves to `AwaitingPeer`, and eagerly
    /// opens the local channel endpoint so the first join completes
    /// without an extra round trip.
    pub fn create_room(bus: &RoomBus) -> Result<Self, ConnectionError> {
        Self::create_room_with(bus, CoordinatorConfig::default())
    }

    /// Creates a room as the Initiator with explicit configuration.
    pub fn create_room_with(
        bus: &RoomBus,
        config: CoordinatorConfig,
    ) -> Result<Self, ConnectionError> {
        let room = RoomCode::generate();
        let coordinator = Self::start(Role::Initiator, room, bus, config)?;
        info!(room = %coordinator.room, "room created");

        // Eager open: park the channel half before any peer attaches.
        {
            let shared = Arc::clone(&coordinator.shared);
            tokio::spawn(async move {
                shared.negotiation.lock().await.open_started = true;
                Shared::open_channel(shared).await;
            });
        }
        Ok(coordinator)
    }

    /// Joins an existing room as the Responder with default configuration.
    ///
    /// The code is canonicalized; `"ab12cd"` joins `"AB12CD"`.
    pub fn join_room(bus: &RoomBus, code: &str) -> Result<Self, ConnectionError> {
        Self::join_room_with(bus, code, CoordinatorConfig::default())
    }

    /// Joins an existing room as the Responder with explicit configuration.
    pub fn join_room_with(
        bus: &RoomBus,
        code: &str,
        config: CoordinatorConfig,
    ) -> Result<Self, ConnectionError> {
        let room = RoomCode::parse(code)?;
        let coordinator = Self::start(Role::Responder, room, bus, config)?;

        // Announce ourselves so the initiator produces its offer.
        coordinator
            .shared
            .handle
            .broadcast(SignalingEnvelope::Announce {
                session_id: Uuid::new_v4(),
            })?;
        info!(room = %coordinator.room, "room joined");
        Ok(coordinator)
    }

    fn start(
        role: Role,
        room: RoomCode,
        bus: &RoomBus,
        config: CoordinatorConfig,
    ) -> Result<Self, ConnectionError> {
        let handle = Arc::new(bus.attach(role)?);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            role,
            config,
            handle,
            rendezvous: bus.rendezvous(),
            state: StdMutex::new(ConnectionState::Idle),
            opened: AtomicBool::new(false),
            channel: StdMutex::new(None),
            negotiation: Mutex::new(Negotiation {
                local: None,
                remote: None,
                pending_candidates: Vec::new(),
                accepted_candidates: 0,
                candidate_failures: 0,
                open_started: false,
            }),
            events_tx,
            cancel: CancellationToken::new(),
        });

        shared.set_state(ConnectionState::AwaitingPeer);
        Shared::spawn_driver(Arc::clone(&shared));
        Shared::spawn_negotiation_timeout(Arc::clone(&shared));

        Ok(Self {
            room,
            shared,
            events_rx: StdMutex::new(Some(events_rx)),
        })
    }

    /// This endpoint's fixed role.
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// The canonical room code.
    pub fn room_code(&self) -> &RoomCode {
        &self.room
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// `true` while the channel can carry transfers.
    pub fn is_usable(&self) -> bool {
        self.state().is_usable()
    }

    /// The open channel, once the coordinator reaches `Open`.
    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.shared.channel.lock().unwrap().clone()
    }

    /// Takes the event receiver. Can only be taken once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// Serializes the local session descriptor to an opaque token for
    /// manual out-of-band exchange.
    ///
    /// The initiator produces its offer on demand; the responder has a
    /// descriptor only after applying an offer. Fails once the
    /// coordinator is closed.
    pub async fn export_token(&self) -> Result<String, ConnectionError> {
        if self.state() == ConnectionState::Closed {
            return Err(NegotiationError::Closed.into());
        }
        let descriptor = match self.shared.role {
            Role::Initiator => self.shared.ensure_local_offer().await,
            Role::Responder => {
                let negotiation = self.shared.negotiation.lock().await;
                negotiation
                    .local
                    .clone()
                    .ok_or(NegotiationError::NoLocalDescriptor)?
            }
        };
        Ok(encode_token(&descriptor)?)
    }

    /// Parses a manual token and feeds the descriptor to the coordinator
    /// as if it had arrived over the broker.
    ///
    /// Fails with an invalid-token error on anything that does not decode
    /// to a recognized descriptor; coordinator state is untouched on
    /// failure. Fails once the coordinator is closed.
    pub async fn import_token(&self, token: &str) -> Result<(), ConnectionError> {
        if self.state() == ConnectionState::Closed {
            return Err(NegotiationError::Closed.into());
        }
        let descriptor = decode_token(token)?;
        match (self.shared.role, descriptor.kind) {
            (Role::Responder, DescriptorKind::Offer) => {
                self.shared.apply_offer(descriptor).await?
            }
            (Role::Initiator, DescriptorKind::Answer) => {
                self.shared.apply_answer(descriptor).await?
            }
            (role, got) => {
                return Err(NegotiationError::UnexpectedDescriptor {
                    expected: match role {
                        Role::Initiator => DescriptorKind::Answer,
                        Role::Responder => DescriptorKind::Offer,
                    },
                    got,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Tears the coordinator down: state moves to `Closed`, the channel
    /// (if any) is closed, and background tasks stop.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self.state.lock().unwrap();
            // Closed is terminal.
            if *state == next || *state == ConnectionState::Closed {
                return;
            }
            debug!(role = ?self.role, from = ?*state, to = ?next, "state transition");
            *state = next;
        }
        self.emit(ConnectionEvent::StateChanged {
            state: next,
            usable: next.is_usable(),
            label: next.label(),
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn close(&self) {
        self.set_state(ConnectionState::Closed);
        if let Some(channel) = self.channel.lock().unwrap().as_ref() {
            channel.close();
        }
        self.cancel.cancel();
    }

    fn spawn_driver(shared: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    envelope = shared.handle.recv() => match envelope {
                        Some(envelope) => shared.handle_envelope(envelope).await,
                        None => break,
                    },
                }
            }
        });
    }

    fn spawn_negotiation_timeout(shared: Arc<Self>) {
        let timeout = shared.config.negotiation_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    // The bound covers negotiation only; a connection that
                    // opened is out of the timer's hands.
                    if shared.opened.load(Ordering::Acquire) {
                        return;
                    }
                    let state = shared.state();
                    if !matches!(state, ConnectionState::Open | ConnectionState::Closed) {
                        warn!(role = ?shared.role, ?state, "negotiation timed out");
                        shared.emit(ConnectionEvent::NegotiationFailed {
                            error: NegotiationError::TimedOut.to_string(),
                        });
                        shared.close();
                    }
                }
            }
        });
    }

    async fn handle_envelope(self: &Arc<Self>, envelope: SignalingEnvelope) {
        let result = match (self.role, envelope) {
            (Role::Initiator, SignalingEnvelope::Announce { .. }) => {
                self.ensure_local_offer().await;
                Ok(())
            }
            (Role::Responder, SignalingEnvelope::Offer { descriptor }) => {
                self.apply_offer(descriptor).await
            }
            (Role::Initiator, SignalingEnvelope::Answer { descriptor }) => {
                self.apply_answer(descriptor).await
            }
            (_, SignalingEnvelope::IceCandidate { candidate }) => {
                self.handle_candidate(candidate).await
            }
            (role, envelope) => {
                debug!(?role, ?envelope, "ignoring envelope not addressed to this role");
                Ok(())
            }
        };
        if let Err(error) = result {
            // Surface the rejection; the coordinator keeps its state.
            warn!(role = ?self.role, %error, "negotiation step rejected");
            self.emit(ConnectionEvent::NegotiationFailed {
                error: error.to_string(),
            });
        }
    }

    /// Produces the initiator's offer exactly once, moving to
    /// `Negotiating` and broadcasting the offer plus local candidates.
    async fn ensure_local_offer(&self) -> SessionDescriptor {
        let mut negotiation = self.negotiation.lock().await;
        if let Some(local) = &negotiation.local {
            return local.clone();
        }
        let descriptor = SessionDescriptor::new(DescriptorKind::Offer);
        negotiation.local = Some(descriptor.clone());
        drop(negotiation);

        self.set_state(ConnectionState::Negotiating);
        self.broadcast_best_effort(SignalingEnvelope::Offer {
            descriptor: descriptor.clone(),
        });
        self.broadcast_local_candidates(descriptor.session_id);
        descriptor
    }

    /// Responder: applies a remote offer, produces and sends the answer.
    async fn apply_offer(
        self: &Arc<Self>,
        descriptor: SessionDescriptor,
    ) -> Result<(), NegotiationError> {
        if descriptor.kind != DescriptorKind::Offer {
            return Err(NegotiationError::UnexpectedDescriptor {
                expected: DescriptorKind::Offer,
                got: descriptor.kind,
            });
        }
        let answer = {
            let mut negotiation = self.negotiation.lock().await;
            if negotiation.remote.is_some() {
                return Err(NegotiationError::AlreadyApplied);
            }
            negotiation.remote = Some(descriptor);
            let answer = SessionDescriptor::new(DescriptorKind::Answer);
            negotiation.local = Some(answer.clone());
            answer
        };

        self.set_state(ConnectionState::Negotiating);
        self.broadcast_best_effort(SignalingEnvelope::Answer {
            descriptor: answer.clone(),
        });
        self.broadcast_local_candidates(answer.session_id);
        self.replay_pending_candidates().await;
        Ok(())
    }

    /// Initiator: applies the remote answer.
    async fn apply_answer(
        self: &Arc<Self>,
        descriptor: SessionDescriptor,
    ) -> Result<(), NegotiationError> {
        if descriptor.kind != DescriptorKind::Answer {
            return Err(NegotiationError::UnexpectedDescriptor {
                expected: DescriptorKind::Answer,
                got: descriptor.kind,
            });
        }
        {
            let mut negotiation = self.negotiation.lock().await;
            if negotiation.remote.is_some() {
                return Err(NegotiationError::AlreadyApplied);
            }
            negotiation.remote = Some(descriptor);
        }
        self.replay_pending_candidates().await;
        Ok(())
    }

    async fn handle_candidate(
        self: &Arc<Self>,
        candidate: Candidate,
    ) -> Result<(), NegotiationError> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.remote.is_none() {
            // No remote description yet: queue for replay, never drop.
            debug!(role = ?self.role, "queueing candidate until remote description arrives");
            negotiation.pending_candidates.push(candidate);
            return Ok(());
        }
        self.apply_candidate_locked(&mut negotiation, candidate)
    }

    /// Replays candidates queued before the remote description existed.
    async fn replay_pending_candidates(self: &Arc<Self>) {
        let mut negotiation = self.negotiation.lock().await;
        let pending = std::mem::take(&mut negotiation.pending_candidates);
        for candidate in pending {
            if let Err(error) = self.apply_candidate_locked(&mut negotiation, candidate) {
                warn!(role = ?self.role, %error, "queued candidate rejected on replay");
                self.emit(ConnectionEvent::NegotiationFailed {
                    error: error.to_string(),
                });
            }
        }
        self.maybe_open_locked(&mut negotiation);
    }

    fn apply_candidate_locked(
        self: &Arc<Self>,
        negotiation: &mut Negotiation,
        candidate: Candidate,
    ) -> Result<(), NegotiationError> {
        if candidate.is_well_formed() {
            negotiation.accepted_candidates += 1;
            self.maybe_open_locked(negotiation);
            Ok(())
        } else {
            negotiation.candidate_failures += 1;
            if negotiation.candidate_failures >= self.config.max_candidate_retries {
                warn!(
                    role = ?self.role,
                    failures = negotiation.candidate_failures,
                    "candidate failure bound reached; giving up"
                );
                self.close();
            }
            Err(NegotiationError::BadCandidate(candidate.candidate))
        }
    }

    /// Responder gate: open the channel half once the remote description
    /// is applied and at least one candidate succeeded. The initiator's
    /// half was parked eagerly at room creation.
    fn maybe_open_locked(self: &Arc<Self>, negotiation: &mut Negotiation) {
        if self.role != Role::Responder
            || negotiation.open_started
            || negotiation.remote.is_none()
            || negotiation.accepted_candidates == 0
        {
            return;
        }
        negotiation.open_started = true;
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            Shared::open_channel(shared).await;
        });
    }

    async fn open_channel(shared: Arc<Self>) {
        let channel = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            channel = shared.rendezvous.open(shared.config.low_water) => Arc::new(channel),
        };
        *shared.channel.lock().unwrap() = Some(Arc::clone(&channel));
        shared.opened.store(true, Ordering::Release);
        info!(role = ?shared.role, "transport connected");
        shared.set_state(ConnectionState::Open);

        // Degrade when an open channel reports closure.
        tokio::spawn(async move {
            channel.closed().await;
            if shared.state() == ConnectionState::Open {
                warn!(role = ?shared.role, "channel lost while open");
                shared.set_state(ConnectionState::Degraded);
            }
        });
    }

    fn broadcast_best_effort(&self, envelope: SignalingEnvelope) {
        match self.handle.broadcast(envelope) {
            Ok(()) => {}
            Err(SignalingError::NoPeer) => {
                // Manual-token flows have no peer attached yet.
                debug!(role = ?self.role, "no peer attached; envelope not delivered");
            }
            Err(error) => warn!(role = ?self.role, %error, "broadcast failed"),
        }
    }

    fn broadcast_local_candidates(&self, session_id: Uuid) {
        for candidate in local_candidates(session_id) {
            self.broadcast_best_effort(SignalingEnvelope::IceCandidate { candidate });
        }
    }
}

/// Fabricates this endpoint's network-discovery candidates.
fn local_candidates(session_id: Uuid) -> Vec<Candidate> {
    vec![
        Candidate {
            candidate: format!("candidate:host udp {session_id}"),
        },
        Candidate {
            candidate: format!("candidate:srflx udp {session_id}"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Drains events until the wanted state shows up or the stream ends.
    async fn wait_for_state(
        events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
        wanted: ConnectionState,
    ) -> bool {
        let deadline = tokio::time::sleep(Duration::from_secs(5));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return false,
                event = events.recv() => match event {
                    Some(ConnectionEvent::StateChanged { state, usable, .. }) if state == wanted => {
                        assert_eq!(usable, wanted == ConnectionState::Open);
                        return true;
                    }
                    Some(_) => {}
                    None => return false,
                },
            }
        }
    }

    #[tokio::test]
    async fn create_room_awaits_peer_and_parks_eagerly() {
        let bus = RoomBus::new();
        let initiator = Coordinator::create_room(&bus).unwrap();
        assert_eq!(initiator.role(), Role::Initiator);
        assert_eq!(initiator.state(), ConnectionState::AwaitingPeer);
        assert_eq!(initiator.room_code().as_str().len(), 6);

        // The channel half is parked before any peer attaches.
        tokio::task::yield_now().await;
        assert!(bus.rendezvous().is_parked().await);
    }

    #[tokio::test]
    async fn full_handshake_reaches_open_on_both_sides() {
        let bus = RoomBus::new();
        let initiator = Coordinator::create_room(&bus).unwrap();
        let mut initiator_events = initiator.take_events().unwrap();
        let code = initiator.room_code().as_str().to_lowercase();

        let responder = Coordinator::join_room(&bus, &code).unwrap();
        let mut responder_events = responder.take_events().unwrap();

        assert!(wait_for_state(&mut initiator_events, ConnectionState::Open).await);
        assert!(wait_for_state(&mut responder_events, ConnectionState::Open).await);
        assert!(initiator.is_usable());
        assert!(responder.is_usable());

        // The two channels are actually mated.
        let a = initiator.channel().unwrap();
        let b = responder.channel().unwrap();
        a.send(roomdrop_channel::Frame::Text("ping".into())).unwrap();
        assert_eq!(
            b.recv().await.unwrap(),
            roomdrop_channel::Frame::Text("ping".into())
        );
    }

    #[tokio::test]
    async fn join_without_initiator_fails() {
        let bus = RoomBus::new();
        assert!(matches!(
            Coordinator::join_room(&bus, "AB12CD"),
            Err(ConnectionError::Signaling(SignalingError::NoPeer))
        ));
    }

    #[tokio::test]
    async fn join_rejects_malformed_code() {
        let bus = RoomBus::new();
        let _initiator = Coordinator::create_room(&bus).unwrap();
        assert!(matches!(
            Coordinator::join_room(&bus, "nope"),
            Err(ConnectionError::Room(_))
        ));
    }

    #[tokio::test]
    async fn invalid_token_leaves_state_unchanged() {
        let bus = RoomBus::new();
        let initiator = Coordinator::create_room(&bus).unwrap();
        let before = initiator.state();

        let err = initiator.import_token("not-base64!!").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Token(_)));
        assert_eq!(initiator.state(), before);
    }

    #[tokio::test]
    async fn token_roundtrip_between_roles() {
        let initiator_bus = RoomBus::new();
        let responder_bus = RoomBus::new();
        let initiator = Coordinator::create_room(&initiator_bus).unwrap();
        let _peer_slot = responder_bus.attach(Role::Initiator).unwrap();
        let responder = Coordinator::join_room(&responder_bus, "AB12CD").unwrap();

        // Offer travels out-of-band, answer travels back.
        let offer_token = initiator.export_token().await.unwrap();
        responder.import_token(&offer_token).await.unwrap();
        let answer_token = responder.export_token().await.unwrap();
        initiator.import_token(&answer_token).await.unwrap();

        assert_eq!(initiator.state(), ConnectionState::Negotiating);
        assert_eq!(responder.state(), ConnectionState::Negotiating);
    }

    #[tokio::test]
    async fn initiator_rejects_imported_offer() {
        let bus = RoomBus::new();
        let initiator = Coordinator::create_room(&bus).unwrap();
        let offer = SessionDescriptor::new(DescriptorKind::Offer);
        let token = encode_token(&offer).unwrap();

        let err = initiator.import_token(&token).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Negotiation(NegotiationError::UnexpectedDescriptor { .. })
        ));
    }

    #[tokio::test]
    async fn responder_export_before_offer_fails() {
        // A silent initiator slot keeps the announce deliverable while
        // never producing an offer.
        let bus = RoomBus::new();
        let _silent_initiator = bus.attach(Role::Initiator).unwrap();
        let responder = Coordinator::join_room(&bus, "AB12CD").unwrap();

        let err = responder.export_token().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Negotiation(NegotiationError::NoLocalDescriptor)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn negotiation_timeout_closes() {
        let bus = RoomBus::new();
        let config = CoordinatorConfig {
            negotiation_timeout: Duration::from_secs(2),
            ..CoordinatorConfig::default()
        };
        let initiator = Coordinator::create_room_with(&bus, config).unwrap();
        let mut events = initiator.take_events().unwrap();

        // No peer ever joins; the paused clock auto-advances past the bound.
        assert!(wait_for_state(&mut events, ConnectionState::Closed).await);
        assert_eq!(initiator.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_spares_a_connection_that_opened() {
        let bus = RoomBus::new();
        let config = CoordinatorConfig {
            negotiation_timeout: Duration::from_secs(2),
            ..CoordinatorConfig::default()
        };
        let initiator = Coordinator::create_room_with(&bus, config.clone()).unwrap();
        let mut initiator_events = initiator.take_events().unwrap();
        let responder =
            Coordinator::join_room_with(&bus, initiator.room_code().as_str(), config).unwrap();
        let mut responder_events = responder.take_events().unwrap();
        assert!(wait_for_state(&mut initiator_events, ConnectionState::Open).await);
        assert!(wait_for_state(&mut responder_events, ConnectionState::Open).await);

        // Drop to Degraded, then let the negotiation timer fire. The
        // degraded connection stays retry-eligible.
        initiator.channel().unwrap().close();
        assert!(wait_for_state(&mut responder_events, ConnectionState::Degraded).await);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(responder.state(), ConnectionState::Degraded);
        assert_eq!(initiator.state(), ConnectionState::Degraded);
    }

    #[tokio::test]
    async fn repeated_bad_candidates_close_the_coordinator() {
        let bus = RoomBus::new();
        let initiator_slot = bus.attach(Role::Initiator).unwrap();
        let responder = Coordinator::join_room(&bus, "AB12CD").unwrap();
        let mut events = responder.take_events().unwrap();

        // A valid offer makes candidates applicable, then every
        // candidate is malformed until the failure bound trips.
        initiator_slot
            .broadcast(SignalingEnvelope::Offer {
                descriptor: SessionDescriptor::new(DescriptorKind::Offer),
            })
            .unwrap();
        for _ in 0..CoordinatorConfig::default().max_candidate_retries {
            initiator_slot
                .broadcast(SignalingEnvelope::IceCandidate {
                    candidate: Candidate {
                        candidate: "garbage".into(),
                    },
                })
                .unwrap();
        }

        assert!(wait_for_state(&mut events, ConnectionState::Closed).await);
        assert_eq!(responder.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn closed_coordinator_rejects_token_operations() {
        let bus = RoomBus::new();
        let initiator = Coordinator::create_room(&bus).unwrap();
        initiator.close();

        assert!(matches!(
            initiator.export_token().await,
            Err(ConnectionError::Negotiation(NegotiationError::Closed))
        ));
        assert!(matches!(
            initiator.import_token("whatever").await,
            Err(ConnectionError::Negotiation(NegotiationError::Closed))
        ));
    }

    #[tokio::test]
    async fn close_tears_down_channel() {
        let bus = RoomBus::new();
        let initiator = Coordinator::create_room(&bus).unwrap();
        let responder = Coordinator::join_room(&bus, initiator.room_code().as_str()).unwrap();
        let mut events = responder.take_events().unwrap();
        assert!(wait_for_state(&mut events, ConnectionState::Open).await);

        let channel = responder.channel().unwrap();
        responder.close();
        assert_eq!(responder.state(), ConnectionState::Closed);
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn peer_loss_degrades_open_connection() {
        let bus = RoomBus::new();
        let initiator = Coordinator::create_room(&bus).unwrap();
        let mut initiator_events = initiator.take_events().unwrap();
        let responder = Coordinator::join_room(&bus, initiator.room_code().as_str()).unwrap();
        let mut responder_events = responder.take_events().unwrap();
        assert!(wait_for_state(&mut initiator_events, ConnectionState::Open).await);
        assert!(wait_for_state(&mut responder_events, ConnectionState::Open).await);

        // The initiator's channel goes away; the responder degrades.
        initiator.channel().unwrap().close();
        assert!(wait_for_state(&mut responder_events, ConnectionState::Degraded).await);
    }
}
