//! Channel rendezvous: mates the two halves of a channel pair.
//!
//! The first endpoint to open creates the pair and parks the peer's half;
//! its open resolves once the second endpoint collects it. This is what
//! lets the initiator open its channel endpoint eagerly, before any peer
//! has attached, so the first join completes without an extra round trip.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::channel::Channel;

struct Parked {
    half: Channel,
    connected: Arc<Notify>,
}

/// A one-room channel rendezvous.
#[derive(Default)]
pub struct Rendezvous {
    slot: Mutex<Option<Parked>>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the local channel endpoint.
    ///
    /// The first caller parks a half and waits for the peer; the second
    /// caller completes the pair. Both calls resolve at the moment the
    /// channel becomes connected. `low_water` is taken from the first
    /// caller (the pair's creator).
    pub async fn open(&self, low_water: u64) -> Channel {
        let (mine, connected) = {
            let mut slot = self.slot.lock().await;
            match slot.take() {
                Some(parked) => {
                    debug!("rendezvous completed by second endpoint");
                    parked.connected.notify_one();
                    return parked.half;
                }
                None => {
                    let (mine, theirs) = Channel::pair(low_water);
                    let connected = Arc::new(Notify::new());
                    *slot = Some(Parked {
                        half: theirs,
                        connected: Arc::clone(&connected),
                    });
                    debug!("rendezvous parked local endpoint");
                    (mine, connected)
                }
            }
        };
        connected.notified().await;
        mine
    }

    /// `true` if a half is currently parked awaiting its peer.
    pub async fn is_parked(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
