//! The room registry: shared state and every compound room operation.
//!
//! Rooms live in a [`DashMap`] keyed by name; each operation holds the
//! per-room entry lock across its mutation *and* the resulting broadcasts,
//! so concurrent joins, leaves, and moderation on the same room can never
//! interleave into an inconsistent snapshot. Broadcasts are non-blocking
//! channel sends, so no lock is ever held across an await point.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parley_protocol::ServerEnvelope;
use thiserror::Error;
use tracing::{debug, info};

use crate::room::{ModerationAction, Room};
use crate::session::Session;

/// Registry errors.
///
/// All are scoped to the offending session: none aborts a connection or
/// touches other sessions or rooms.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Create against a name that is already registered.
    #[error("room already exists: {0}")]
    RoomExists(String),

    /// Join or room-scoped operation against an unregistered name.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Room-scoped operation from a session that is not a member.
    #[error("not a member of room: {0}")]
    NotMember(String),

    /// Message attempt while muted.
    #[error("muted in room: {0}")]
    Muted(String),

    /// Moderation attempt without admin standing.
    #[error("not an admin of room: {0}")]
    NotAdmin(String),

    /// Unrecognized moderation action.
    #[error("unknown moderation action: {0}")]
    UnknownAction(String),
}

impl RegistryError {
    /// Stable wire code for the error envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::RoomExists(_) => "room_exists",
            RegistryError::RoomNotFound(_) => "room_not_found",
            RegistryError::NotMember(_) => "not_member",
            RegistryError::Muted(_) => "muted",
            RegistryError::NotAdmin(_) => "not_admin",
            RegistryError::UnknownAction(_) => "unknown_action",
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Minimum interval between accepted typing updates per (identity, room).
    pub typing_window: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            typing_window: Duration::from_millis(2000),
        }
    }
}

/// The room registry, instantiated once per process and shared by every
/// connection handler.
pub struct RoomRegistry {
    /// Rooms indexed by name.
    rooms: DashMap<String, Room>,
    /// Configuration.
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating room registry with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    /// Number of currently registered rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Check if a room is registered.
    #[must_use]
    pub fn room_exists(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// Current member identities of a room (empty if unregistered).
    #[must_use]
    pub fn member_identities(&self, name: &str) -> Vec<String> {
        self.rooms
            .get(name)
            .map(|r| r.member_identities())
            .unwrap_or_default()
    }

    /// Create a room, seed its admin set, and auto-join the creator.
    ///
    /// The creator's identity is claimed from `sender` and seeded into the
    /// admin set alongside any directory-provided identities. A system
    /// notice goes to the creator only.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomExists`] without any mutation if the
    /// name is already registered.
    pub fn create(
        &self,
        session: &Arc<Session>,
        name: &str,
        sender: &str,
        seeded_admins: Vec<String>,
    ) -> Result<(), RegistryError> {
        match self.rooms.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::RoomExists(name.to_string())),
            Entry::Vacant(slot) => {
                session.claim_identity(sender);
                let mut room = Room::new(name, sender, seeded_admins);
                room.add_member(session.clone());
                session.track_room(name);
                slot.insert(room);

                debug!(room = %name, creator = %sender, "room created");
                session.send(ServerEnvelope::system(
                    Some(name),
                    format!("room \"{name}\" created"),
                ));
                Ok(())
            }
        }
    }

    /// Join an existing room.
    ///
    /// Claims the identity from `sender`, announces `user_joined` to the
    /// other members, sends the joiner a system notice, then broadcasts a
    /// presence snapshot to the whole room including the joiner.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomNotFound`] if the name is unregistered.
    pub fn join(
        &self,
        session: &Arc<Session>,
        name: &str,
        sender: &str,
    ) -> Result<(), RegistryError> {
        let Some(mut room) = self.rooms.get_mut(name) else {
            return Err(RegistryError::RoomNotFound(name.to_string()));
        };

        session.claim_identity(sender);
        room.add_member(session.clone());
        session.track_room(name);

        debug!(room = %name, identity = %sender, members = room.member_count(), "member joined");

        room.broadcast_except(&ServerEnvelope::user_joined(name, sender), session.id());
        session.send(ServerEnvelope::system(
            Some(name),
            format!("you joined \"{name}\""),
        ));
        room.broadcast(&ServerEnvelope::presence(name, room.member_identities()));
        Ok(())
    }

    /// Leave a room.
    ///
    /// Soft: a no-op, not an error, if the session was not a member or the
    /// room is gone. Clears the leaver from the typing set (broadcasting the
    /// update only when other typers remain), announces `user_left` and a
    /// presence snapshot to the remaining members, and deregisters the room
    /// the instant it becomes empty.
    pub fn leave(&self, session: &Arc<Session>, name: &str) {
        session.untrack_room(name);

        let emptied = {
            let Some(mut room) = self.rooms.get_mut(name) else {
                return;
            };
            if room.remove_member(session.id()).is_none() {
                return;
            }

            let identity = session.identity();
            if let Some(who) = &identity {
                if room.clear_typing(who) && !room.typing_is_empty() {
                    room.broadcast(&ServerEnvelope::typing(name, room.typers()));
                }
            }

            if room.is_empty() {
                true
            } else {
                if let Some(who) = &identity {
                    room.broadcast(&ServerEnvelope::user_left(name, who));
                }
                room.broadcast(&ServerEnvelope::presence(name, room.member_identities()));
                false
            }
        };

        session.send(ServerEnvelope::system(
            Some(name),
            format!("you left \"{name}\""),
        ));

        if emptied {
            self.drop_if_empty(name);
        }
    }

    /// Run the leave operation for every room the session occupies.
    ///
    /// Called on disconnect; idempotent and never errors, even when rooms
    /// were vacated concurrently.
    pub fn disconnect(&self, session: &Arc<Session>) {
        for name in session.rooms() {
            self.leave(session, &name);
        }
        debug!(session = session.id(), "session disconnected");
    }

    /// Broadcast a presence snapshot to the full room on explicit request.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unregistered or the session is not a
    /// member.
    pub fn presence_request(&self, session: &Arc<Session>, name: &str) -> Result<(), RegistryError> {
        let Some(room) = self.rooms.get_mut(name) else {
            return Err(RegistryError::RoomNotFound(name.to_string()));
        };
        if !room.has_member(session.id()) {
            return Err(RegistryError::NotMember(name.to_string()));
        }
        room.broadcast(&ServerEnvelope::presence(name, room.member_identities()));
        Ok(())
    }

    /// Broadcast a chat message to every member, including the sender.
    ///
    /// The timestamp is caller-supplied when present, server time otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unregistered, the session is not a
    /// member, or the sender's identity is muted in this room.
    pub fn send_message(
        &self,
        session: &Arc<Session>,
        name: &str,
        content: &str,
        timestamp: Option<u64>,
        reply_to: Option<String>,
    ) -> Result<(), RegistryError> {
        let Some(room) = self.rooms.get_mut(name) else {
            return Err(RegistryError::RoomNotFound(name.to_string()));
        };
        if !room.has_member(session.id()) {
            return Err(RegistryError::NotMember(name.to_string()));
        }
        let Some(sender) = session.identity() else {
            return Err(RegistryError::NotMember(name.to_string()));
        };
        if room.is_muted(&sender) {
            return Err(RegistryError::Muted(name.to_string()));
        }

        room.broadcast(&ServerEnvelope::Message {
            room: name.to_string(),
            sender,
            content: content.to_string(),
            timestamp: timestamp.unwrap_or_else(now_millis),
            reply_to,
        });
        Ok(())
    }

    /// Broadcast a reaction to every member.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unregistered or the session is not a
    /// member.
    pub fn send_reaction(
        &self,
        session: &Arc<Session>,
        name: &str,
        target: &str,
        emoji: &str,
    ) -> Result<(), RegistryError> {
        let Some(room) = self.rooms.get_mut(name) else {
            return Err(RegistryError::RoomNotFound(name.to_string()));
        };
        if !room.has_member(session.id()) {
            return Err(RegistryError::NotMember(name.to_string()));
        }
        let Some(sender) = session.identity() else {
            return Err(RegistryError::NotMember(name.to_string()));
        };

        room.broadcast(&ServerEnvelope::Reaction {
            room: name.to_string(),
            sender,
            target: target.to_string(),
            emoji: emoji.to_string(),
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Apply a typing-indicator update, throttled per (identity, room).
    ///
    /// An update inside the throttle window is silently dropped (rate
    /// limiting, not a validation failure). An accepted update broadcasts
    /// the full typing set to every member.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unregistered or the session is not a
    /// member with an identity.
    pub fn typing(
        &self,
        session: &Arc<Session>,
        name: &str,
        typing: bool,
    ) -> Result<(), RegistryError> {
        let Some(mut room) = self.rooms.get_mut(name) else {
            return Err(RegistryError::RoomNotFound(name.to_string()));
        };
        if !room.has_member(session.id()) {
            return Err(RegistryError::NotMember(name.to_string()));
        }
        let Some(identity) = session.identity() else {
            return Err(RegistryError::NotMember(name.to_string()));
        };

        if !room.typing_update(&identity, typing, self.config.typing_window) {
            return Ok(());
        }
        room.broadcast(&ServerEnvelope::typing(name, room.typers()));
        Ok(())
    }

    /// Apply a moderation action.
    ///
    /// The actor must be a member and an admin of the room; only then is the
    /// action string interpreted. `kick` reuses the full leave semantics for
    /// the first member session asserting the target identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unregistered, the actor is not a
    /// member or not an admin, or the action is unrecognized. Failures apply
    /// no mutation.
    pub fn moderate(
        &self,
        session: &Arc<Session>,
        name: &str,
        action: &str,
        target: &str,
    ) -> Result<(), RegistryError> {
        let emptied = {
            let Some(mut room) = self.rooms.get_mut(name) else {
                return Err(RegistryError::RoomNotFound(name.to_string()));
            };
            if !room.has_member(session.id()) {
                return Err(RegistryError::NotMember(name.to_string()));
            }
            let Some(actor) = session.identity() else {
                return Err(RegistryError::NotMember(name.to_string()));
            };
            if !room.is_admin(&actor) {
                return Err(RegistryError::NotAdmin(name.to_string()));
            }
            let Ok(action) = action.parse::<ModerationAction>() else {
                return Err(RegistryError::UnknownAction(action.to_string()));
            };

            debug!(room = %name, actor = %actor, ?action, target = %target, "moderation");

            match action {
                ModerationAction::Mute => {
                    room.mute(target);
                    room.broadcast(&ServerEnvelope::system(
                        Some(name),
                        format!("{actor} muted {target}"),
                    ));
                    false
                }
                ModerationAction::Unmute => {
                    room.unmute(target);
                    false
                }
                ModerationAction::Promote => {
                    room.promote(target);
                    false
                }
                ModerationAction::Demote => {
                    room.demote(target);
                    false
                }
                ModerationAction::Kick => match room.member_by_identity(target) {
                    Some(victim) => {
                        victim.untrack_room(name);
                        room.remove_member(victim.id());

                        if room.clear_typing(target) && !room.typing_is_empty() {
                            room.broadcast(&ServerEnvelope::typing(name, room.typers()));
                        }

                        let emptied = room.is_empty();
                        if !emptied {
                            room.broadcast(&ServerEnvelope::user_left(name, target));
                            room.broadcast(&ServerEnvelope::presence(
                                name,
                                room.member_identities(),
                            ));
                        }
                        victim.send(ServerEnvelope::system(
                            Some(name),
                            format!("you were removed from \"{name}\" by {actor}"),
                        ));
                        emptied
                    }
                    None => false,
                },
            }
        };

        if emptied {
            self.drop_if_empty(name);
        }
        Ok(())
    }

    /// Deregister a room if it is still empty.
    ///
    /// `remove_if` re-checks emptiness under the entry lock, so a join that
    /// raced in after the caller released the room cannot be torn down.
    fn drop_if_empty(&self, name: &str) {
        if self.rooms.remove_if(name, |_, room| room.is_empty()).is_some() {
            debug!(room = %name, "room deregistered");
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
