//! Full-stack scenarios: pairing through a room bus, negotiation to an
//! open channel, and chunked transfers riding on top.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use roomdrop_channel::Frame;
use roomdrop_connection::{ConnectionEvent, ConnectionState, Coordinator};
use roomdrop_protocol::{CHUNK_SIZE, TransferStatus};
use roomdrop_signaling::RoomBus;
use roomdrop_transfer::{
    FALLBACK_ANNOTATION, FallbackInsight, HistoryStore, InMemoryHistory, TransferEvent,
    TransferReceiver, TransferSender,
};

const DEADLINE: Duration = Duration::from_secs(5);

async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    wanted: ConnectionState,
) {
    timeout(DEADLINE, async {
        while let Some(event) = events.recv().await {
            if let ConnectionEvent::StateChanged { state, .. } = event {
                if state == wanted {
                    return;
                }
            }
        }
        panic!("event stream ended before reaching {wanted:?}");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {wanted:?}"));
}

/// Pairs two endpoints over a fresh bus; the responder joins with the
/// lowercased room code.
async fn connect(bus: &RoomBus) -> (Coordinator, Coordinator) {
    let initiator = Coordinator::create_room(bus).unwrap();
    let mut initiator_events = initiator.take_events().unwrap();
    let code = initiator.room_code().as_str().to_lowercase();

    let responder = Coordinator::join_room(bus, &code).unwrap();
    let mut responder_events = responder.take_events().unwrap();

    wait_for_state(&mut initiator_events, ConnectionState::Open).await;
    wait_for_state(&mut responder_events, ConnectionState::Open).await;
    (initiator, responder)
}

struct Inbound {
    receiver: Arc<TransferReceiver>,
    events: mpsc::UnboundedReceiver<TransferEvent>,
    history: Arc<InMemoryHistory>,
}

/// Spawns a receiver pump on the responder's channel.
fn inbound_side(responder: &Coordinator) -> Inbound {
    let history = Arc::new(InMemoryHistory::new());
    let (receiver, events) = TransferReceiver::new(Arc::new(FallbackInsight), Arc::clone(&history) as Arc<dyn HistoryStore>);
    let receiver = Arc::new(receiver);
    let pump = Arc::clone(&receiver);
    let channel = responder.channel().unwrap();
    tokio::spawn(async move {
        pump.run(channel).await;
    });
    Inbound {
        receiver,
        events,
        history,
    }
}

async fn wait_completed(events: &mut mpsc::UnboundedReceiver<TransferEvent>, id: Uuid) {
    timeout(DEADLINE, async {
        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::Completed { id: done } if done == id => return,
                TransferEvent::Failed { error, .. } => panic!("transfer failed: {error}"),
                _ => {}
            }
        }
        panic!("event stream ended before completion");
    })
    .await
    .expect("timed out waiting for completion");
}

#[tokio::test]
async fn lowercase_code_pairs_and_opens() {
    let bus = RoomBus::new();
    let (initiator, responder) = connect(&bus).await;
    assert!(initiator.is_usable());
    assert!(responder.is_usable());
    // The responder canonicalized the lowercased code.
    assert_eq!(initiator.room_code(), responder.room_code());
}

#[tokio::test]
async fn payload_crosses_the_room_in_three_chunks() {
    let bus = RoomBus::new();
    let (initiator, responder) = connect(&bus).await;

    let mut inbound = inbound_side(&responder);
    let (sender, mut sender_events) = TransferSender::new(initiator.channel().unwrap());

    let payload: Vec<u8> = (0..40000u32).map(|i| (i % 251) as u8).collect();
    let id = sender
        .send("photo.jpg", "image/jpeg", payload.clone())
        .unwrap();

    wait_completed(&mut sender_events, id).await;
    wait_completed(&mut inbound.events, id).await;

    // 40000 bytes is two full chunks plus one short one.
    assert_eq!(40000usize.div_ceil(CHUNK_SIZE), 3);
    assert_eq!(inbound.receiver.take_payload(id).unwrap(), payload);

    let sent = sender.record(id).unwrap();
    assert_eq!(sent.status, TransferStatus::Completed);
    assert_eq!(sent.progress_percent, 100.0);
    let received = inbound.receiver.record(id).unwrap();
    assert_eq!(received.status, TransferStatus::Completed);
    assert_eq!(received.offset, 40000);

    // Completion reached the history with the fallback annotation.
    timeout(DEADLINE, async {
        loop {
            if let Some(TransferEvent::Insight { annotation, .. }) = inbound.events.recv().await {
                assert_eq!(annotation, FALLBACK_ANNOTATION);
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for the insight annotation");
    let entries = inbound.history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "photo.jpg");
    assert_eq!(entries[0].size, 40000);
}

#[tokio::test]
async fn pause_freezes_progress_and_resume_continues() {
    let bus = RoomBus::new();
    let (initiator, responder) = connect(&bus).await;

    let mut inbound = inbound_side(&responder);
    let (sender, mut sender_events) = TransferSender::new(initiator.channel().unwrap());

    let payload: Vec<u8> = (0..40000u32).map(|i| i as u8).collect();
    let id = sender
        .send("big.bin", "application/octet-stream", payload.clone())
        .unwrap();

    // Pause at the first chunk boundary.
    timeout(DEADLINE, async {
        while let Some(event) = sender_events.recv().await {
            if let TransferEvent::Progress { offset, .. } = event {
                assert_eq!(offset, CHUNK_SIZE as u64);
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for the first chunk");
    sender.pause(id).unwrap();

    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    let paused = sender.record(id).unwrap();
    assert_eq!(paused.status, TransferStatus::Paused);
    assert_eq!(paused.offset, CHUNK_SIZE as u64);

    // Resume continues exactly where it stopped; the receiver sees
    // every byte exactly once.
    sender.resume(id).unwrap();
    wait_completed(&mut sender_events, id).await;
    wait_completed(&mut inbound.events, id).await;
    assert_eq!(inbound.receiver.take_payload(id).unwrap(), payload);
}

#[tokio::test]
async fn garbage_frames_do_not_poison_later_transfers() {
    let bus = RoomBus::new();
    let (initiator, responder) = connect(&bus).await;

    let mut inbound = inbound_side(&responder);
    let channel = initiator.channel().unwrap();
    // Neither a malformed control frame nor a truncated chunk frame
    // disturbs the channel.
    channel.send(Frame::Text("{{{ not json".into())).unwrap();
    channel.send(Frame::Binary(vec![0; 7])).unwrap();

    let (sender, mut sender_events) = TransferSender::new(channel);
    let id = sender.send("after.txt", "text/plain", vec![42; 100]).unwrap();
    wait_completed(&mut sender_events, id).await;
    wait_completed(&mut inbound.events, id).await;
    assert_eq!(inbound.receiver.take_payload(id).unwrap(), vec![42; 100]);
}

#[tokio::test]
async fn invalid_token_leaves_a_live_connection_alone() {
    let bus = RoomBus::new();
    let (initiator, _responder) = connect(&bus).await;

    let err = initiator.import_token("not-base64!!").await.unwrap_err();
    assert!(err.to_string().contains("token"));
    assert_eq!(initiator.state(), ConnectionState::Open);
    assert!(initiator.is_usable());
}
