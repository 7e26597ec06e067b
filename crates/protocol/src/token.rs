//! Manual handshake tokens.
//!
//! When no broker is reachable, the session descriptor can be carried
//! out-of-band (copy/paste, QR) as an opaque string: base64 of the
//! descriptor's JSON, e.g. `{"type":"offer","sessionId":...}`. Import
//! rejects anything that does not decode to a recognized descriptor.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::signaling::SessionDescriptor;

/// Errors produced when importing a manual token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Serializes a session descriptor to an opaque token string.
pub fn encode_token(descriptor: &SessionDescriptor) -> Result<String, TokenError> {
    let json = serde_json::to_vec(descriptor)
        .map_err(|e| TokenError::InvalidToken(format!("descriptor serialization: {e}")))?;
    Ok(BASE64.encode(json))
}

/// Parses an opaque token string back into a session descriptor.
pub fn decode_token(token: &str) -> Result<SessionDescriptor, TokenError> {
    let bytes = BASE64
        .decode(token.trim())
        .map_err(|e| TokenError::InvalidToken(format!("not base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::InvalidToken(format!("not a session descriptor: {e}")))
}
