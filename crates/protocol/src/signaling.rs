//! Signaling envelopes exchanged over the room bus during negotiation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a session descriptor is the initiator's offer or the
/// responder's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    Offer,
    Answer,
}

/// A serialized local session description.
///
/// The `session_id` identifies the endpoint's channel rendezvous session;
/// applying the remote descriptor is what lets candidates be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    #[serde(rename = "type")]
    pub kind: DescriptorKind,
    pub session_id: Uuid,
}

impl SessionDescriptor {
    /// Creates a fresh descriptor of the given kind.
    pub fn new(kind: DescriptorKind) -> Self {
        Self {
            kind,
            session_id: Uuid::new_v4(),
        }
    }
}

/// A network-discovery candidate.
///
/// Candidates are opaque to the coordinator beyond the `candidate:`
/// prefix check performed on application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate: String,
}

impl Candidate {
    /// `true` if the candidate text is well-formed enough to apply.
    pub fn is_well_formed(&self) -> bool {
        self.candidate.starts_with("candidate:") && self.candidate.len() > "candidate:".len()
    }
}

/// A small envelope delivered between the two room participants.
///
/// Same-direction envelopes arrive in send order; there is no ordering
/// guarantee across envelope types from different directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingEnvelope {
    /// A responder announcing itself to the room.
    #[serde(rename_all = "camelCase")]
    Announce { session_id: Uuid },
    /// The initiator's session descriptor.
    Offer { descriptor: SessionDescriptor },
    /// The responder's session descriptor.
    Answer { descriptor: SessionDescriptor },
    /// A network-discovery candidate, exchanged while not yet open.
    IceCandidate { candidate: Candidate },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_json_uses_type_tag() {
        let env = SignalingEnvelope::Announce {
            session_id: Uuid::nil(),
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"announce\""));
        assert!(json.contains("sessionId"));
    }

    #[test]
    fn offer_roundtrip() {
        let env = SignalingEnvelope::Offer {
            descriptor: SessionDescriptor::new(DescriptorKind::Offer),
        };
        let json = serde_json::to_string(&env).unwrap();
        let parsed: SignalingEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn descriptor_kind_serializes_lowercase() {
        let desc = SessionDescriptor::new(DescriptorKind::Answer);
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("\"type\":\"answer\""));
    }

    #[test]
    fn candidate_well_formedness() {
        let good = Candidate {
            candidate: "candidate:host 192.0.2.7 61000".into(),
        };
        assert!(good.is_well_formed());

        let empty = Candidate {
            candidate: String::new(),
        };
        assert!(!empty.is_well_formed());

        let bare_prefix = Candidate {
            candidate: "candidate:".into(),
        };
        assert!(!bare_prefix.is_well_formed());

        let wrong_prefix = Candidate {
            candidate: "host 192.0.2.7".into(),
        };
        assert!(!wrong_prefix.is_well_formed());
    }

    #[test]
    fn unknown_envelope_type_rejected() {
        let json = r#"{"type":"renegotiate","sessionId":"00000000-0000-0000-0000-000000000000"}"#;
        assert!(serde_json::from_str::<SignalingEnvelope>(json).is_err());
    }
}
