//! In-memory duplex channel with buffered-amount accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::debug;

use crate::error::ChannelError;
use crate::frame::Frame;

/// One endpoint of an ordered, reliable, message-oriented channel.
///
/// Frames sent here arrive at the peer in emission order. The outbound
/// buffered amount counts bytes enqueued locally that the peer has not
/// yet consumed; [`drained`](Channel::drained) resolves once that falls
/// to or below the low water mark. Closing either half closes both.
pub struct Channel {
    tx: mpsc::UnboundedSender<Frame>,
    rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    /// Bytes we enqueued that the peer has not yet consumed.
    outstanding: Arc<AtomicU64>,
    /// Fired by the peer when `outstanding` drops to the low water mark.
    drained_notify: Arc<Notify>,
    /// The peer's `outstanding` counter; we decrement it on recv.
    peer_outstanding: Arc<AtomicU64>,
    /// The peer's drained notify; we fire it on recv.
    peer_drained: Arc<Notify>,
    low_water: u64,
    open: Arc<AtomicBool>,
    closed_notify: Arc<Notify>,
}

impl Channel {
    /// Creates a connected pair of channel halves with the given low
    /// water mark (bytes).
    pub fn pair(low_water: u64) -> (Channel, Channel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a_out = Arc::new(AtomicU64::new(0));
        let b_out = Arc::new(AtomicU64::new(0));
        let a_drained = Arc::new(Notify::new());
        let b_drained = Arc::new(Notify::new());
        let open = Arc::new(AtomicBool::new(true));
        let closed_notify = Arc::new(Notify::new());

        let a = Channel {
            tx: a_tx,
            rx: Mutex::new(b_rx),
            outstanding: Arc::clone(&a_out),
            drained_notify: Arc::clone(&a_drained),
            peer_outstanding: Arc::clone(&b_out),
            peer_drained: Arc::clone(&b_drained),
            low_water,
            open: Arc::clone(&open),
            closed_notify: Arc::clone(&closed_notify),
        };
        let b = Channel {
            tx: b_tx,
            rx: Mutex::new(a_rx),
            outstanding: b_out,
            drained_notify: b_drained,
            peer_outstanding: a_out,
            peer_drained: a_drained,
            low_water,
            open,
            closed_notify,
        };
        (a, b)
    }

    /// `true` while neither half has closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Bytes enqueued locally that the peer has not yet consumed.
    pub fn buffered_amount(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }

    /// The low water mark below which [`drained`](Channel::drained) fires.
    pub fn low_water(&self) -> u64 {
        self.low_water
    }

    /// Enqueues a frame for the peer.
    pub fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        self.outstanding
            .fetch_add(frame.len() as u64, Ordering::AcqRel);
        self.tx.send(frame).map_err(|_| {
            self.mark_closed();
            ChannelError::Closed
        })
    }

    /// Receives the next frame in emission order.
    ///
    /// Frames already in flight when the channel closes are still
    /// delivered; once the queue is empty a closed channel yields
    /// [`ChannelError::Closed`].
    pub async fn recv(&self) -> Result<Frame, ChannelError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.try_recv() {
                Ok(frame) => return Ok(self.account_received(frame)),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.mark_closed();
                    return Err(ChannelError::Closed);
                }
            }
            if !self.is_open() {
                return Err(ChannelError::Closed);
            }

            let closed = self.closed_notify.notified();
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(frame) => return Ok(self.account_received(frame)),
                    None => {
                        self.mark_closed();
                        return Err(ChannelError::Closed);
                    }
                },
                // Re-check the queue so in-flight frames drain first.
                _ = closed => {}
            }
        }
    }

    /// Resolves once the outbound buffered amount is at or below the low
    /// water mark (or the channel closes).
    pub async fn drained(&self) {
        loop {
            let notified = self.drained_notify.notified();
            if self.buffered_amount() <= self.low_water || !self.is_open() {
                return;
            }
            notified.await;
        }
    }

    /// Resolves once the channel is closed.
    pub async fn closed(&self) {
        loop {
            let notified = self.closed_notify.notified();
            if !self.is_open() {
                return;
            }
            notified.await;
        }
    }

    /// Closes both halves. Idempotent.
    pub fn close(&self) {
        self.mark_closed();
    }

    fn mark_closed(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!("channel closed");
            self.closed_notify.notify_waiters();
            // Wake pacing waiters on both sides so they observe closure.
            self.drained_notify.notify_waiters();
            self.peer_drained.notify_waiters();
        }
    }

    fn account_received(&self, frame: Frame) -> Frame {
        let len = frame.len() as u64;
        let before = self.peer_outstanding.fetch_sub(len, Ordering::AcqRel);
        if before.saturating_sub(len) <= self.low_water {
            self.peer_drained.notify_waiters();
        }
        frame
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
