//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat relay.
//!
//! This crate defines the text envelopes exchanged between clients and the
//! server: the closed inbound union with per-kind required fields, the
//! outbound envelope enum, and the JSON codec between them.
//!
//! ## Envelope kinds
//!
//! - Inbound: `create`, `join`, `leave`, `message`, `reaction`,
//!   `presence_request`, `typing`, `moderate`
//! - Outbound: `system`, `error`, `presence`, `user_joined`, `user_left`,
//!   `message`, `reaction`, `typing`
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEnvelope};
//!
//! let env = codec::decode(r#"{"kind": "join", "room": "lobby", "sender": "alice"}"#).unwrap();
//! assert!(matches!(env, ClientEnvelope::Join { .. }));
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::{ClientEnvelope, RawEnvelope, ServerEnvelope};
