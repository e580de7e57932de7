//! Codec for encoding and decoding Parley envelopes.
//!
//! The wire format is one JSON object per WebSocket text message. Decoding
//! runs the raw JSON parse and the required-field validation in one step so
//! callers only ever see a [`ClientEnvelope`] or a [`ProtocolError`].

use thiserror::Error;

use crate::envelope::{ClientEnvelope, RawEnvelope, ServerEnvelope};

/// Protocol errors that can occur while decoding inbound envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Unparseable input.
    #[error("malformed envelope")]
    Malformed(#[from] serde_json::Error),

    /// Required fields absent, non-string, or blank.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Unrecognized kind discriminator.
    #[error("unknown kind: {0}")]
    UnknownKind(String),
}

impl ProtocolError {
    /// Stable wire code for the error envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "malformed",
            ProtocolError::MissingFields(_) => "validation",
            ProtocolError::UnknownKind(_) => "unknown_kind",
        }
    }
}

/// Encode an outbound envelope as a single JSON text record.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(envelope: &ServerEnvelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode and validate an inbound text record.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] for unparseable input,
/// [`ProtocolError::MissingFields`] or [`ProtocolError::UnknownKind`] for
/// envelopes that parse but fail validation.
pub fn decode(raw: &str) -> Result<ClientEnvelope, ProtocolError> {
    let envelope: RawEnvelope = serde_json::from_str(raw)?;
    envelope.into_envelope()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid() {
        let env = decode(r#"{"kind": "join", "room": "lobby", "sender": "alice"}"#).unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Join {
                room: "lobby".into(),
                sender: "alice".into()
            }
        );
    }

    #[test]
    fn test_decode_malformed() {
        let err = decode("not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
        assert_eq!(err.code(), "malformed");
    }

    #[test]
    fn test_decode_non_object() {
        // A JSON array parses but is not an envelope.
        assert!(decode("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_error_codes() {
        let err = decode(r#"{"kind": "create"}"#).unwrap_err();
        assert_eq!(err.code(), "validation");
        assert_eq!(err.to_string(), "missing required fields: room, sender");

        let err = decode(r#"{"kind": "warp", "room": "lobby"}"#).unwrap_err();
        assert_eq!(err.code(), "unknown_kind");
        assert_eq!(err.to_string(), "unknown kind: warp");
    }

    #[test]
    fn test_encode_is_single_line() {
        let text = encode(&ServerEnvelope::presence(
            "lobby",
            vec!["alice".into(), "bob".into()],
        ))
        .unwrap();
        assert!(!text.contains('\n'));
        assert!(text.starts_with('{') && text.ends_with('}'));
    }

    #[test]
    fn test_unknown_inbound_fields_ignored() {
        let env = decode(
            r#"{"kind": "leave", "room": "lobby", "color": "purple", "nested": {"a": 1}}"#,
        )
        .unwrap();
        assert_eq!(env, ClientEnvelope::Leave { room: "lobby".into() });
    }
}
