//! Room codes and negotiation roles.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Alphabet used when generating codes. Uppercase alphanumerics with the
/// easily-confused `0/O` and `1/I` left out; parsing still accepts the
/// full alphanumeric range.
const GENERATION_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Errors produced when parsing a room code.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomCodeError {
    #[error("room code must be {ROOM_CODE_LEN} characters, got {0}")]
    BadLength(usize),

    #[error("room code contains non-alphanumeric character {0:?}")]
    BadCharacter(char),
}

/// A 6-character room code pairing exactly two endpoints.
///
/// Canonical form is uppercase; parsing canonicalizes, so
/// `"ab12cd"` and `"AB12CD"` name the same room. Client-side only,
/// scoped to the session lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Parses and canonicalizes a room code.
    ///
    /// Accepts either the bare 6-character code or a URL whose final path
    /// segment is the code (the form carried in QR payloads).
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let raw = input
            .trim()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(input);

        if raw.chars().count() != ROOM_CODE_LEN {
            return Err(RoomCodeError::BadLength(raw.chars().count()));
        }
        if let Some(bad) = raw.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(RoomCodeError::BadCharacter(bad));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// Generates a fresh random room code.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code: String = (0..ROOM_CODE_LEN)
            .map(|_| GENERATION_ALPHABET[rng.gen_range(0..GENERATION_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// The canonical (uppercase) code text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// Fixed role of an endpoint in the two-party negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Created the room; produces the offer.
    Initiator,
    /// Joined the room; produces the answer.
    Responder,
}

impl Role {
    /// The opposite role.
    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}
