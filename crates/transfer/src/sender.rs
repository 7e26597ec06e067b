//! Outbound chunked transfer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use roomdrop_channel::{Channel, Frame};
use roomdrop_protocol::{
    CHUNK_SIZE, ChunkFrame, ControlAction, ControlMessage, Direction, HIGH_WATER_MARK,
    TransferRecord, TransferStatus,
};

use crate::TransferError;
use crate::events::TransferEvent;

/// Tunables for the sender.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Outbound buffering bound: chunk writes defer while the channel
    /// reports more than this many bytes buffered.
    pub high_water: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            high_water: HIGH_WATER_MARK,
        }
    }
}

/// Controls for one in-flight send loop.
struct ActiveSend {
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
}

/// Shared sender state, also held by each spawned send loop.
struct SenderInner {
    channel: Arc<Channel>,
    high_water: u64,
    records: Mutex<HashMap<Uuid, TransferRecord>>,
    active: Mutex<HashMap<Uuid, ActiveSend>>,
    events_tx: mpsc::UnboundedSender<TransferEvent>,
}

/// Sends payloads over an open channel as a metadata announce followed
/// by 16 KiB chunks.
///
/// Each transfer runs in its own spawned loop. The loop suspends while
/// the channel's buffered amount exceeds the high water mark and checks
/// pause and cancel requests between chunks only, so a chunk already
/// issued always finishes.
pub struct TransferSender {
    inner: Arc<SenderInner>,
}

impl TransferSender {
    /// Creates a sender over the channel and returns its event stream.
    pub fn new(channel: Arc<Channel>) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        Self::new_with(channel, SenderConfig::default())
    }

    /// Creates a sender with explicit tunables.
    pub fn new_with(
        channel: Arc<Channel>,
        config: SenderConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SenderInner {
            channel,
            high_water: config.high_water,
            records: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            events_tx,
        });
        (Self { inner }, events_rx)
    }

    /// Starts sending a payload and returns its transfer id.
    ///
    /// The metadata announce is enqueued before this returns, so the
    /// peer always learns of the transfer before its first chunk.
    pub fn send(
        &self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<Uuid, TransferError> {
        if !self.inner.channel.is_open() {
            return Err(TransferError::ConnectionLost);
        }

        let id = Uuid::new_v4();
        let record = TransferRecord::new(id, name, payload.len() as u64, mime_type, Direction::Outbound);

        let announce = ControlMessage::MetadataAnnounce {
            transfer_id: id,
            name: record.name.clone(),
            total_size: record.total_size,
            mime_type: record.mime_type.clone(),
        };
        let text = announce.encode()?;
        self.inner
            .channel
            .send(Frame::Text(text))
            .map_err(|_| TransferError::ConnectionLost)?;

        debug!(%id, size = record.total_size, "send started");
        self.inner.records.lock().unwrap().insert(id, record.clone());
        self.inner.emit(TransferEvent::Created { record });
        self.inner.set_status(id, TransferStatus::InProgress);

        let (paused, paused_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        self.inner.active.lock().unwrap().insert(
            id,
            ActiveSend {
                paused,
                cancel: cancel.clone(),
            },
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_send(id, payload, paused_rx, cancel).await;
        });
        Ok(id)
    }

    /// Pauses an in-flight transfer and notifies the peer.
    pub fn pause(&self, id: Uuid) -> Result<(), TransferError> {
        self.set_paused(id, true, ControlAction::Pause, TransferStatus::Paused)
    }

    /// Resumes a paused transfer from exactly where it stopped.
    pub fn resume(&self, id: Uuid) -> Result<(), TransferError> {
        self.set_paused(id, false, ControlAction::Resume, TransferStatus::InProgress)
    }

    /// Aborts an in-flight transfer; its record becomes Failed.
    pub fn cancel(&self, id: Uuid) -> Result<(), TransferError> {
        let active = self.inner.active.lock().unwrap();
        let entry = active.get(&id).ok_or(TransferError::UnknownTransfer(id))?;
        entry.cancel.cancel();
        Ok(())
    }

    /// Snapshot of one transfer record.
    pub fn record(&self, id: Uuid) -> Option<TransferRecord> {
        self.inner.records.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of all transfer records.
    pub fn records(&self) -> Vec<TransferRecord> {
        self.inner.records.lock().unwrap().values().cloned().collect()
    }

    /// Discards a finished transfer's record.
    pub fn remove_record(&self, id: Uuid) -> Result<(), TransferError> {
        if self.inner.active.lock().unwrap().contains_key(&id) {
            return Err(TransferError::AlreadyActive(id));
        }
        self.inner
            .records
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(TransferError::UnknownTransfer(id))
    }

    fn set_paused(
        &self,
        id: Uuid,
        paused: bool,
        action: ControlAction,
        status: TransferStatus,
    ) -> Result<(), TransferError> {
        {
            let active = self.inner.active.lock().unwrap();
            let entry = active.get(&id).ok_or(TransferError::UnknownTransfer(id))?;
            // The loop observes the flag at its next chunk boundary.
            let _ = entry.paused.send(paused);
        }

        // Advisory notice for the peer's record view.
        let msg = ControlMessage::TransferControl {
            transfer_id: id,
            action,
        };
        let text = msg.encode()?;
        if self.inner.channel.send(Frame::Text(text)).is_err() {
            warn!(%id, ?action, "control notice dropped, channel closed");
        }

        self.inner.set_status(id, status);
        Ok(())
    }
}

impl SenderInner {
    async fn run_send(
        self: Arc<Self>,
        id: Uuid,
        payload: Vec<u8>,
        mut paused_rx: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) {
        if payload.is_empty() {
            let percent = self.advance(id, 0);
            self.emit(TransferEvent::Progress {
                id,
                offset: 0,
                percent,
            });
            self.finish(id);
            return;
        }

        let mut offset = 0usize;
        let mut sequence = 0u32;
        loop {
            // Pause and cancel only take effect between chunks.
            if cancel.is_cancelled() {
                self.abort(id);
                return;
            }
            if *paused_rx.borrow() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.abort(id);
                        return;
                    }
                    changed = paused_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue;
                    }
                }
            }

            // Pacing: defer while the channel buffer sits above the high
            // water mark.
            while self.channel.buffered_amount() > self.high_water {
                if !self.channel.is_open() {
                    self.fail(id, TransferError::ConnectionLost.to_string());
                    return;
                }
                self.channel.drained().await;
            }

            let end = (offset + CHUNK_SIZE).min(payload.len());
            let frame = match ChunkFrame::new(id, sequence, payload[offset..end].to_vec()) {
                Ok(frame) => frame,
                Err(err) => {
                    self.fail(id, err.to_string());
                    return;
                }
            };
            if self.channel.send(Frame::Binary(frame.encode())).is_err() {
                self.fail(id, TransferError::ConnectionLost.to_string());
                return;
            }
            sequence += 1;
            offset = end;

            let percent = self.advance(id, offset as u64);
            self.emit(TransferEvent::Progress {
                id,
                offset: offset as u64,
                percent,
            });

            if offset == payload.len() {
                self.finish(id);
                return;
            }
            // Yield so controls enqueued by the caller are observed.
            tokio::task::yield_now().await;
        }
    }

    fn advance(&self, id: Uuid, offset: u64) -> f64 {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&id) {
            Some(record) => {
                record.offset = offset;
                record.progress_percent = record.progress();
                record.progress_percent
            }
            None => 0.0,
        }
    }

    fn finish(&self, id: Uuid) {
        self.active.lock().unwrap().remove(&id);
        self.set_status(id, TransferStatus::Completed);
        self.emit(TransferEvent::Completed { id });
        debug!(%id, "send completed");
    }

    fn abort(&self, id: Uuid) {
        self.active.lock().unwrap().remove(&id);
        self.fail_inner(id, TransferError::Aborted(id).to_string());
    }

    fn fail(&self, id: Uuid, error: String) {
        self.active.lock().unwrap().remove(&id);
        self.fail_inner(id, error);
    }

    fn fail_inner(&self, id: Uuid, error: String) {
        self.set_status(id, TransferStatus::Failed);
        self.emit(TransferEvent::Failed { id, error });
    }

    fn set_status(&self, id: Uuid, status: TransferStatus) {
        let changed = {
            let mut records = self.records.lock().unwrap();
            match records.get_mut(&id) {
                Some(record) if !record.status.is_terminal() && record.status != status => {
                    record.status = status;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(TransferEvent::StatusChanged { id, status });
        }
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events_tx.send(event);
    }
}
