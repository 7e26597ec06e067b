//! Binary chunk framing.
//!
//! # Wire format
//!
//! ```text
//! [16 bytes: transfer id (UUID)]
//! [4 bytes BE: sequence number]
//! [<= 16384 bytes: payload]
//! ```
//!
//! Every chunk carries its transfer id and a per-transfer sequence
//! number, so the receiver reassembles via a per-id keyed buffer map
//! instead of a single ambient "current transfer". Sequence numbers start
//! at 0 and increment by one per chunk.

use uuid::Uuid;

use crate::CHUNK_SIZE;

/// Fixed header size: 16-byte id + 4-byte sequence.
pub const CHUNK_HEADER_LEN: usize = 20;

/// Errors produced when decoding a binary chunk frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("chunk frame too short: {0} bytes (header is {CHUNK_HEADER_LEN})")]
    TooShort(usize),

    #[error("chunk payload of {0} bytes exceeds the {CHUNK_SIZE}-byte limit")]
    Oversized(usize),
}

/// A decoded chunk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub transfer_id: Uuid,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl ChunkFrame {
    /// Builds a frame, validating the payload size.
    pub fn new(transfer_id: Uuid, sequence: u32, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() > CHUNK_SIZE {
            return Err(FrameError::Oversized(payload.len()));
        }
        Ok(Self {
            transfer_id,
            sequence,
            payload,
        })
    }

    /// Encodes the frame into its binary wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(self.transfer_id.as_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes a binary frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < CHUNK_HEADER_LEN {
            return Err(FrameError::TooShort(bytes.len()));
        }
        let payload = &bytes[CHUNK_HEADER_LEN..];
        if payload.len() > CHUNK_SIZE {
            return Err(FrameError::Oversized(payload.len()));
        }

        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[..16]);
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&bytes[16..CHUNK_HEADER_LEN]);

        Ok(Self {
            transfer_id: Uuid::from_bytes(id),
            sequence: u32::from_be_bytes(seq),
            payload: payload.to_vec(),
        })
    }
}
