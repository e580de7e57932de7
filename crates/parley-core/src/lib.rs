//! # parley-core
//!
//! Session, room, and broadcast state machine for the Parley chat relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Session** - One connection's live state (identity, joined rooms)
//! - **Room** - A named broadcast group with membership and permission state
//! - **RoomRegistry** - Atomic create/join/leave/moderation operations and
//!   the presence/typing broadcast triggers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Session   │────▶│ RoomRegistry │────▶│    Room     │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     broadcast to member
//!                     sessions' outboxes
//! ```
//!
//! Every compound operation on a room (membership mutation + broadcast,
//! permission mutation + broadcast, typing mutation + broadcast) executes
//! under that room's entry lock; operations on different rooms proceed
//! independently.

pub mod registry;
pub mod room;
pub mod session;

pub use registry::{RegistryConfig, RegistryError, RoomRegistry};
pub use room::{ModerationAction, Room};
pub use session::{Session, SessionId};
