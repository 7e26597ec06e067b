//! Inbound chunk reassembly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use roomdrop_channel::{Channel, Frame};
use roomdrop_protocol::{
    ChunkFrame, ControlAction, ControlMessage, Direction, TransferRecord, TransferStatus,
};

use crate::TransferError;
use crate::events::TransferEvent;
use crate::history::{HistoryEntry, HistoryStore};
use crate::insight::InsightLookup;

/// One transfer's reassembly buffer.
struct Reassembly {
    next_sequence: u32,
    bytes: Vec<u8>,
    total_size: u64,
}

/// Receives control and chunk frames from a channel and reassembles
/// complete payloads.
///
/// Chunks are keyed by the transfer id carried in each frame, so
/// interleaved transfers reassemble independently. A frame that cannot
/// be attributed — malformed, unknown id, out-of-sequence, or past the
/// announced size — is logged and dropped without disturbing the
/// channel or other transfers.
pub struct TransferReceiver {
    insight: Arc<dyn InsightLookup>,
    history: Arc<dyn HistoryStore>,
    records: Mutex<HashMap<Uuid, TransferRecord>>,
    buffers: Mutex<HashMap<Uuid, Reassembly>>,
    payloads: Mutex<HashMap<Uuid, Vec<u8>>>,
    events_tx: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferReceiver {
    /// Creates a receiver with its collaborators and returns its event
    /// stream.
    pub fn new(
        insight: Arc<dyn InsightLookup>,
        history: Arc<dyn HistoryStore>,
    ) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                insight,
                history,
                records: Mutex::new(HashMap::new()),
                buffers: Mutex::new(HashMap::new()),
                payloads: Mutex::new(HashMap::new()),
                events_tx,
            },
            events_rx,
        )
    }

    /// Consumes frames from the channel until it closes.
    ///
    /// Frames already in flight at close time are still processed; once
    /// the channel yields no more frames, unfinished transfers are
    /// marked Failed.
    pub async fn run(&self, channel: Arc<Channel>) {
        while let Ok(frame) = channel.recv().await {
            match frame {
                Frame::Text(text) => self.handle_control(&text).await,
                Frame::Binary(bytes) => self.handle_chunk(&bytes).await,
            }
        }
        self.fail_unfinished();
    }

    /// Takes the reassembled payload of a completed transfer.
    pub fn take_payload(&self, id: Uuid) -> Option<Vec<u8>> {
        self.payloads.lock().unwrap().remove(&id)
    }

    /// Snapshot of one transfer record.
    pub fn record(&self, id: Uuid) -> Option<TransferRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of all transfer records.
    pub fn records(&self) -> Vec<TransferRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    /// Discards a transfer's record, buffer, and payload.
    pub fn remove_record(&self, id: Uuid) -> Result<(), TransferError> {
        self.buffers.lock().unwrap().remove(&id);
        self.payloads.lock().unwrap().remove(&id);
        self.records
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(TransferError::UnknownTransfer(id))
    }

    async fn handle_control(&self, text: &str) {
        let msg = match ControlMessage::decode(text) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(%err, "malformed control frame dropped");
                return;
            }
        };
        match msg {
            ControlMessage::MetadataAnnounce {
                transfer_id,
                name,
                total_size,
                mime_type,
            } => self.handle_announce(transfer_id, name, total_size, mime_type).await,
            ControlMessage::TransferControl {
                transfer_id,
                action,
            } => self.handle_action(transfer_id, action),
        }
    }

    async fn handle_announce(&self, id: Uuid, name: String, total_size: u64, mime_type: String) {
        {
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&id) {
                warn!(%id, "duplicate metadata announce dropped");
                return;
            }
            let record = TransferRecord::new(id, name, total_size, mime_type, Direction::Inbound);
            records.insert(id, record.clone());
            drop(records);
            self.emit(TransferEvent::Created { record });
        }
        debug!(%id, total_size, "inbound transfer announced");
        self.buffers.lock().unwrap().insert(
            id,
            Reassembly {
                next_sequence: 0,
                bytes: Vec::new(),
                total_size,
            },
        );
        self.set_status(id, TransferStatus::InProgress);

        // An empty payload has no chunks to wait for.
        if total_size == 0 {
            let percent = self.advance(id, 0);
            self.emit(TransferEvent::Progress {
                id,
                offset: 0,
                percent,
            });
            self.finalize(id).await;
        }
    }

    fn handle_action(&self, id: Uuid, action: ControlAction) {
        let status = match action {
            ControlAction::Pause => TransferStatus::Paused,
            ControlAction::Resume => TransferStatus::InProgress,
        };
        if self.records.lock().unwrap().contains_key(&id) {
            self.set_status(id, status);
        } else {
            warn!(%id, ?action, "control notice for unknown transfer dropped");
        }
    }

    async fn handle_chunk(&self, bytes: &[u8]) {
        let chunk = match ChunkFrame::decode(bytes) {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(%err, "malformed chunk frame dropped");
                return;
            }
        };
        let id = chunk.transfer_id;

        let progress = {
            let mut buffers = self.buffers.lock().unwrap();
            let Some(buffer) = buffers.get_mut(&id) else {
                warn!(%id, "chunk for unknown transfer dropped");
                return;
            };
            if chunk.sequence != buffer.next_sequence {
                warn!(
                    %id,
                    sequence = chunk.sequence,
                    expected = buffer.next_sequence,
                    "out-of-sequence chunk dropped"
                );
                return;
            }
            let received = buffer.bytes.len() as u64 + chunk.payload.len() as u64;
            if received > buffer.total_size {
                warn!(%id, received, total = buffer.total_size, "chunk past announced size dropped");
                return;
            }
            buffer.next_sequence += 1;
            buffer.bytes.extend_from_slice(&chunk.payload);
            received
        };

        // An advisory pause is not clobbered by chunks already in flight.
        let paused = self
            .records
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|r| r.status == TransferStatus::Paused);
        if !paused {
            self.set_status(id, TransferStatus::InProgress);
        }
        let percent = self.advance(id, progress);
        self.emit(TransferEvent::Progress {
            id,
            offset: progress,
            percent,
        });

        let complete = self
            .buffers
            .lock()
            .unwrap()
            .get(&id)
            .map(|b| b.bytes.len() as u64 == b.total_size)
            .unwrap_or(false);
        if complete {
            self.finalize(id).await;
        }
    }

    /// Completion first, annotation second: the insight lookup runs
    /// after the record is already Completed and cannot fail it.
    async fn finalize(&self, id: Uuid) {
        if let Some(buffer) = self.buffers.lock().unwrap().remove(&id) {
            self.payloads.lock().unwrap().insert(id, buffer.bytes);
        }
        self.set_status(id, TransferStatus::Completed);
        self.emit(TransferEvent::Completed { id });
        debug!(%id, "inbound transfer completed");

        let Some(record) = self.record(id) else {
            return;
        };
        let annotation = self
            .insight
            .describe(&record.name, &record.mime_type, record.total_size)
            .await;
        self.history.append(HistoryEntry {
            transfer_id: id,
            name: record.name,
            mime_type: record.mime_type,
            size: record.total_size,
            direction: Direction::Inbound,
            annotation: annotation.clone(),
        });
        self.emit(TransferEvent::Insight { id, annotation });
    }

    fn fail_unfinished(&self) {
        let unfinished: Vec<Uuid> = {
            let records = self.records.lock().unwrap();
            records
                .values()
                .filter(|r| !r.status.is_terminal())
                .map(|r| r.id)
                .collect()
        };
        for id in unfinished {
            warn!(%id, "channel closed with transfer unfinished");
            self.buffers.lock().unwrap().remove(&id);
            self.set_status(id, TransferStatus::Failed);
            self.emit(TransferEvent::Failed {
                id,
                error: TransferError::ConnectionLost.to_string(),
            });
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
