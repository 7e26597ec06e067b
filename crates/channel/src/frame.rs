//! Channel frames.

/// A single message on the channel: JSON text for control traffic,
/// untagged binary for chunk data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload size in bytes, as counted against the buffered amount.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    /// `true` for zero-length frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
