//! Envelope types for the Parley wire protocol.
//!
//! Inbound traffic arrives as untyped JSON objects carrying a `kind`
//! discriminator. Those are validated field-by-field into the closed
//! [`ClientEnvelope`] union before anything else looks at them. Outbound
//! traffic is the [`ServerEnvelope`] enum, serialized with `kind` as the
//! serde tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::ProtocolError;

/// Raw inbound envelope: every known field, untyped and optional.
///
/// Validation of required fields happens in [`RawEnvelope::into_envelope`],
/// which reports *all* missing or blank fields at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEnvelope {
    pub kind: Option<Value>,
    pub room: Option<Value>,
    pub sender: Option<Value>,
    pub content: Option<Value>,
    pub target: Option<Value>,
    pub emoji: Option<Value>,
    pub action: Option<Value>,
    pub typing: Option<Value>,
    pub timestamp: Option<Value>,
    pub reply_to: Option<Value>,
}

/// A validated inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEnvelope {
    /// Create a room and join it as its first member and admin.
    Create { room: String, sender: String },
    /// Join an existing room.
    Join { room: String, sender: String },
    /// Leave a room (soft: no error if not a member).
    Leave { room: String },
    /// Send a chat message to a room.
    Message {
        room: String,
        content: String,
        /// Caller-supplied timestamp; server time is used when absent.
        timestamp: Option<u64>,
        /// Reference to the message being replied to.
        reply_to: Option<String>,
    },
    /// React to a message in a room.
    Reaction {
        room: String,
        target: String,
        emoji: String,
    },
    /// Request a presence snapshot broadcast.
    PresenceRequest { room: String },
    /// Typing indicator update. The flag reads as false when absent.
    Typing { room: String, typing: bool },
    /// Moderation request. The action stays a string here so the admin
    /// check can run before the action is interpreted.
    Moderate {
        room: String,
        action: String,
        target: String,
    },
}

impl RawEnvelope {
    /// Validate the raw field bag into a [`ClientEnvelope`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingFields`] naming every required field
    /// that is absent, not a string, or blank after trimming, or
    /// [`ProtocolError::UnknownKind`] for an unrecognized discriminator.
    pub fn into_envelope(self) -> Result<ClientEnvelope, ProtocolError> {
        let Some(kind) = string_field(&self.kind) else {
            return Err(ProtocolError::MissingFields(vec!["kind"]));
        };

        let mut missing = Vec::new();

        match kind.as_str() {
            "create" => {
                match (
                    require(&self.room, "room", &mut missing),
                    require(&self.sender, "sender", &mut missing),
                ) {
                    (Some(room), Some(sender)) => Ok(ClientEnvelope::Create { room, sender }),
                    _ => Err(ProtocolError::MissingFields(missing)),
                }
            }
            "join" => {
                match (
                    require(&self.room, "room", &mut missing),
                    require(&self.sender, "sender", &mut missing),
                ) {
                    (Some(room), Some(sender)) => Ok(ClientEnvelope::Join { room, sender }),
                    _ => Err(ProtocolError::MissingFields(missing)),
                }
            }
            "leave" => match require(&self.room, "room", &mut missing) {
                Some(room) => Ok(ClientEnvelope::Leave { room }),
                None => Err(ProtocolError::MissingFields(missing)),
            },
            "message" => {
                match (
                    require(&self.room, "room", &mut missing),
                    require(&self.content, "content", &mut missing),
                ) {
                    (Some(room), Some(content)) => Ok(ClientEnvelope::Message {
                        room,
                        content,
                        timestamp: self.timestamp.as_ref().and_then(Value::as_u64),
                        reply_to: string_field(&self.reply_to),
                    }),
                    _ => Err(ProtocolError::MissingFields(missing)),
                }
            }
            "reaction" => {
                match (
                    require(&self.room, "room", &mut missing),
                    require(&self.target, "target", &mut missing),
                    require(&self.emoji, "emoji", &mut missing),
                ) {
                    (Some(room), Some(target), Some(emoji)) => {
                        Ok(ClientEnvelope::Reaction { room, target, emoji })
                    }
                    _ => Err(ProtocolError::MissingFields(missing)),
                }
            }
            "presence_request" => match require(&self.room, "room", &mut missing) {
                Some(room) => Ok(ClientEnvelope::PresenceRequest { room }),
                None => Err(ProtocolError::MissingFields(missing)),
            },
            "typing" => match require(&self.room, "room", &mut missing) {
                Some(room) => Ok(ClientEnvelope::Typing {
                    room,
                    typing: matches!(self.typing, Some(Value::Bool(true))),
                }),
                None => Err(ProtocolError::MissingFields(missing)),
            },
            "moderate" => {
                match (
                    require(&self.room, "room", &mut missing),
                    require(&self.action, "action", &mut missing),
                    require(&self.target, "target", &mut missing),
                ) {
                    (Some(room), Some(action), Some(target)) => Ok(ClientEnvelope::Moderate {
                        room,
                        action,
                        target,
                    }),
                    _ => Err(ProtocolError::MissingFields(missing)),
                }
            }
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

/// Read a field as a non-blank string, or `None`.
fn string_field(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Read a required string field, recording its name when missing or blank.
fn require(
    value: &Option<Value>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    let field = string_field(value);
    if field.is_none() {
        missing.push(name);
    }
    field
}

/// An outbound envelope.
///
/// Serialized as a flat JSON object with `kind` as the discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// Tailored notice to one session or the whole room.
    System {
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        content: String,
    },

    /// Error response, delivered only to the offending session.
    Error { code: String, message: String },

    /// Presence snapshot: current member identities of a room.
    Presence { room: String, members: Vec<String> },

    /// A user joined the room.
    UserJoined { room: String, identity: String },

    /// A user left the room.
    UserLeft { room: String, identity: String },

    /// A chat message.
    Message {
        room: String,
        sender: String,
        content: String,
        timestamp: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },

    /// A reaction to a message.
    Reaction {
        room: String,
        sender: String,
        target: String,
        emoji: String,
        timestamp: u64,
    },

    /// The full set of currently-typing identities in a room.
    Typing { room: String, typers: Vec<String> },
}

impl ServerEnvelope {
    /// Create a new System envelope.
    #[must_use]
    pub fn system(room: Option<&str>, content: impl Into<String>) -> Self {
        ServerEnvelope::System {
            room: room.map(String::from),
            content: content.into(),
        }
    }

    /// Create a new Error envelope.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEnvelope::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a new Presence envelope.
    #[must_use]
    pub fn presence(room: impl Into<String>, members: Vec<String>) -> Self {
        ServerEnvelope::Presence {
            room: room.into(),
            members,
        }
    }

    /// Create a new UserJoined envelope.
    #[must_use]
    pub fn user_joined(room: impl Into<String>, identity: impl Into<String>) -> Self {
        ServerEnvelope::UserJoined {
            room: room.into(),
            identity: identity.into(),
        }
    }

    /// Create a new UserLeft envelope.
    #[must_use]
    pub fn user_left(room: impl Into<String>, identity: impl Into<String>) -> Self {
        ServerEnvelope::UserLeft {
            room: room.into(),
            identity: identity.into(),
        }
    }

    /// Create a new Typing envelope.
    #[must_use]
    pub fn typing(room: impl Into<String>, typers: Vec<String>) -> Self {
        ServerEnvelope::Typing {
            room: room.into(),
            typers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<ClientEnvelope, ProtocolError> {
        serde_json::from_value::<RawEnvelope>(value)
            .map_err(ProtocolError::from)
            .and_then(RawEnvelope::into_envelope)
    }

    #[test]
    fn test_create_envelope() {
        let env = parse(json!({"kind": "create", "room": "lobby", "sender": "alice"})).unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Create {
                room: "lobby".into(),
                sender: "alice".into()
            }
        );
    }

    #[test]
    fn test_missing_fields_all_named() {
        let err = parse(json!({"kind": "create"})).unwrap_err();
        match err {
            ProtocolError::MissingFields(fields) => {
                assert_eq!(fields, vec!["room", "sender"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_field_rejected() {
        let err = parse(json!({"kind": "join", "room": "   ", "sender": "bob"})).unwrap_err();
        match err {
            ProtocolError::MissingFields(fields) => assert_eq!(fields, vec!["room"]),
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn test_non_string_field_rejected() {
        let err = parse(json!({"kind": "message", "room": 42, "content": "hi"})).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingFields(ref f) if *f == vec!["room"]));
    }

    #[test]
    fn test_unknown_kind() {
        let err = parse(json!({"kind": "dance", "room": "lobby"})).unwrap_err();
        match err {
            ProtocolError::UnknownKind(kind) => assert_eq!(kind, "dance"),
            other => panic!("expected UnknownKind, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_kind() {
        let err = parse(json!({"room": "lobby"})).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingFields(ref f) if *f == vec!["kind"]));
    }

    #[test]
    fn test_message_optional_fields() {
        let env = parse(json!({
            "kind": "message",
            "room": "lobby",
            "content": "hi",
            "timestamp": 1700000000123u64,
            "reply_to": "msg-7"
        }))
        .unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Message {
                room: "lobby".into(),
                content: "hi".into(),
                timestamp: Some(1_700_000_000_123),
                reply_to: Some("msg-7".into()),
            }
        );

        // Optional fields tolerate absence and bad types.
        let env = parse(json!({
            "kind": "message",
            "room": "lobby",
            "content": "hi",
            "timestamp": "not-a-number"
        }))
        .unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Message {
                room: "lobby".into(),
                content: "hi".into(),
                timestamp: None,
                reply_to: None,
            }
        );
    }

    #[test]
    fn test_typing_flag_defaults_false() {
        let env = parse(json!({"kind": "typing", "room": "lobby"})).unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Typing {
                room: "lobby".into(),
                typing: false
            }
        );

        let env = parse(json!({"kind": "typing", "room": "lobby", "typing": true})).unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Typing {
                room: "lobby".into(),
                typing: true
            }
        );

        // Non-boolean flag reads as false rather than erroring.
        let env = parse(json!({"kind": "typing", "room": "lobby", "typing": "yes"})).unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Typing {
                room: "lobby".into(),
                typing: false
            }
        );
    }

    #[test]
    fn test_moderate_keeps_action_uninterpreted() {
        let env = parse(json!({
            "kind": "moderate",
            "room": "lobby",
            "action": "banish",
            "target": "bob"
        }))
        .unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Moderate {
                room: "lobby".into(),
                action: "banish".into(),
                target: "bob".into(),
            }
        );
    }

    #[test]
    fn test_server_envelope_wire_shape() {
        let env = ServerEnvelope::user_joined("lobby", "alice");
        let text = serde_json::to_string(&env).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["kind"], "user_joined");
        assert_eq!(value["room"], "lobby");
        assert_eq!(value["identity"], "alice");
    }

    #[test]
    fn test_server_envelope_omits_empty_optionals() {
        let env = ServerEnvelope::Message {
            room: "lobby".into(),
            sender: "alice".into(),
            content: "hi".into(),
            timestamp: 1,
            reply_to: None,
        };
        let text = serde_json::to_string(&env).unwrap();
        assert!(!text.contains("reply_to"));
    }
}
