//! Wire vocabulary shared by all Roomdrop crates.
//!
//! Defines room codes, signaling envelopes, session descriptors, the
//! control-message vocabulary, binary chunk framing, manual handshake
//! tokens, and transfer records. Everything that crosses a crate or wire
//! boundary lives here; the other crates only add behavior.

pub mod chunk;
pub mod control;
pub mod record;
pub mod room;
pub mod signaling;
pub mod token;

pub use chunk::{ChunkFrame, FrameError};
pub use control::{ControlAction, ControlMessage};
pub use record::{Direction, TransferRecord, TransferStatus};
pub use room::{Role, RoomCode, RoomCodeError};
pub use signaling::{Candidate, DescriptorKind, SessionDescriptor, SignalingEnvelope};
pub use token::{TokenError, decode_token, encode_token};

/// Fixed chunk payload size: 16 KiB. The final chunk of a payload may be
/// shorter; all others are exactly this size.
pub const CHUNK_SIZE: usize = 16384;

/// Outbound buffering high water mark: 2 MiB. The sender defers chunk
/// writes while the channel reports more than this much buffered.
pub const HIGH_WATER_MARK: u64 = 2 * 1024 * 1024;
