//! Room state: membership, permissions, and typing indicators.
//!
//! A room is a named broadcast group. Members are live sessions; the admin
//! and muted sets are keyed by identity string so they survive a member's
//! reconnect under the same name. All mutation happens under the registry's
//! per-room lock.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parley_protocol::ServerEnvelope;
use tracing::trace;

use crate::session::{Session, SessionId};

/// A moderation action, parsed from the wire `action` field after the admin
/// check has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Mute,
    Unmute,
    Kick,
    Promote,
    Demote,
}

impl FromStr for ModerationAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mute" => Ok(ModerationAction::Mute),
            "unmute" => Ok(ModerationAction::Unmute),
            "kick" => Ok(ModerationAction::Kick),
            "promote" => Ok(ModerationAction::Promote),
            "demote" => Ok(ModerationAction::Demote),
            _ => Err(()),
        }
    }
}

/// A named broadcast group with membership and permission state.
#[derive(Debug)]
pub struct Room {
    /// Room name (unique registry key).
    name: String,
    /// Member sessions, keyed by session ID.
    members: HashMap<SessionId, Arc<Session>>,
    /// Identities allowed to moderate this room.
    admins: HashSet<String>,
    /// Identities barred from sending messages in this room.
    muted: HashSet<String>,
    /// Identities currently typing.
    typing: HashSet<String>,
    /// Last accepted typing update per identity, for rate limiting.
    typing_seen: HashMap<String, Instant>,
}

impl Room {
    /// Create a room whose admin set is seeded with the creator plus any
    /// directory-provided identities.
    #[must_use]
    pub fn new(name: impl Into<String>, creator: &str, seeded_admins: Vec<String>) -> Self {
        let mut admins: HashSet<String> = seeded_admins.into_iter().collect();
        admins.insert(creator.to_string());
        Self {
            name: name.into(),
            members: HashMap::new(),
            admins,
            muted: HashSet::new(),
            typing: HashSet::new(),
            typing_seen: HashMap::new(),
        }
    }

    /// Get the room name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of member sessions.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a session is a member.
    #[must_use]
    pub fn has_member(&self, session: SessionId) -> bool {
        self.members.contains_key(&session)
    }

    pub(crate) fn add_member(&mut self, session: Arc<Session>) {
        trace!(room = %self.name, session = session.id(), "member added");
        self.members.insert(session.id(), session);
    }

    pub(crate) fn remove_member(&mut self, session: SessionId) -> Option<Arc<Session>> {
        let removed = self.members.remove(&session);
        if removed.is_some() {
            trace!(room = %self.name, session, "member removed");
        }
        removed
    }

    /// First currently-connected member asserting the given identity.
    #[must_use]
    pub fn member_by_identity(&self, identity: &str) -> Option<Arc<Session>> {
        self.members
            .values()
            .find(|s| s.identity().as_deref() == Some(identity))
            .cloned()
    }

    /// Current member identities, in no particular order.
    #[must_use]
    pub fn member_identities(&self) -> Vec<String> {
        self.members.values().filter_map(|s| s.identity()).collect()
    }

    /// Check if an identity is in the admin set.
    #[must_use]
    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.contains(identity)
    }

    /// Check if an identity is muted.
    #[must_use]
    pub fn is_muted(&self, identity: &str) -> bool {
        self.muted.contains(identity)
    }

    pub(crate) fn mute(&mut self, identity: &str) {
        self.muted.insert(identity.to_string());
    }

    pub(crate) fn unmute(&mut self, identity: &str) {
        self.muted.remove(identity);
    }

    pub(crate) fn promote(&mut self, identity: &str) {
        self.admins.insert(identity.to_string());
    }

    pub(crate) fn demote(&mut self, identity: &str) {
        self.admins.remove(identity);
    }

    /// Identities currently typing, in no particular order.
    #[must_use]
    pub fn typers(&self) -> Vec<String> {
        self.typing.iter().cloned().collect()
    }

    /// Check if nobody is typing.
    #[must_use]
    pub fn typing_is_empty(&self) -> bool {
        self.typing.is_empty()
    }

    /// Drop an identity from the typing set (on leave/kick).
    ///
    /// Returns `true` if the identity was typing.
    pub(crate) fn clear_typing(&mut self, identity: &str) -> bool {
        self.typing_seen.remove(identity);
        self.typing.remove(identity)
    }

    /// Apply a typing update, rate-limited per identity.
    ///
    /// Returns `false` when the update falls inside the throttle window and
    /// must be silently dropped. An accepted update records its timestamp and
    /// adds or removes the identity per the flag.
    pub(crate) fn typing_update(&mut self, identity: &str, typing: bool, window: Duration) -> bool {
        let now = Instant::now();
        if let Some(last) = self.typing_seen.get(identity) {
            if now.duration_since(*last) < window {
                return false;
            }
        }
        self.typing_seen.insert(identity.to_string(), now);
        if typing {
            self.typing.insert(identity.to_string());
        } else {
            self.typing.remove(identity);
        }
        true
    }

    /// Deliver an envelope to every member whose connection is still open.
    pub fn broadcast(&self, envelope: &ServerEnvelope) {
        for member in self.members.values() {
            member.send(envelope.clone());
        }
    }

    /// Deliver an envelope to every member except one, typically the
    /// originator of a join/leave who receives a tailored notice instead.
    pub fn broadcast_except(&self, envelope: &ServerEnvelope, except: SessionId) {
        for member in self.members.values() {
            if member.id() != except {
                member.send(envelope.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn member(identity: &str) -> (Arc<Session>, UnboundedReceiver<ServerEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(tx);
        session.claim_identity(identity);
        (session, rx)
    }

    #[test]
    fn test_creator_seeded_as_admin() {
        let room = Room::new("lobby", "alice", vec!["ops".to_string()]);
        assert!(room.is_admin("alice"));
        assert!(room.is_admin("ops"));
        assert!(!room.is_admin("bob"));
    }

    #[test]
    fn test_membership() {
        let mut room = Room::new("lobby", "alice", Vec::new());
        let (a, _rx) = member("alice");
        let (b, _rx_b) = member("bob");

        room.add_member(a.clone());
        room.add_member(b.clone());
        assert_eq!(room.member_count(), 2);
        assert!(room.has_member(a.id()));

        let mut identities = room.member_identities();
        identities.sort();
        assert_eq!(identities, vec!["alice", "bob"]);

        assert!(room.remove_member(a.id()).is_some());
        assert!(room.remove_member(a.id()).is_none());
        assert!(!room.is_empty());
    }

    #[test]
    fn test_member_by_identity_first_match() {
        let mut room = Room::new("lobby", "alice", Vec::new());
        let (a, _rx_a) = member("dup");
        let (b, _rx_b) = member("dup");
        room.add_member(a);
        room.add_member(b);

        let found = room.member_by_identity("dup").unwrap();
        assert_eq!(found.identity().as_deref(), Some("dup"));
        assert!(room.member_by_identity("nobody").is_none());
    }

    #[test]
    fn test_typing_throttle_window() {
        let mut room = Room::new("lobby", "alice", Vec::new());
        let window = Duration::from_millis(50);

        assert!(room.typing_update("alice", true, window));
        assert!(!room.typing_update("alice", true, window));
        assert_eq!(room.typers(), vec!["alice"]);

        std::thread::sleep(Duration::from_millis(60));
        assert!(room.typing_update("alice", false, window));
        assert!(room.typing_is_empty());
    }

    #[test]
    fn test_throttle_is_per_identity() {
        let mut room = Room::new("lobby", "alice", Vec::new());
        let window = Duration::from_millis(50);

        assert!(room.typing_update("alice", true, window));
        assert!(room.typing_update("bob", true, window));
        let mut typers = room.typers();
        typers.sort();
        assert_eq!(typers, vec!["alice", "bob"]);
    }

    #[test]
    fn test_broadcast_except_skips_originator() {
        let mut room = Room::new("lobby", "alice", Vec::new());
        let (a, mut rx_a) = member("alice");
        let (b, mut rx_b) = member("bob");
        room.add_member(a.clone());
        room.add_member(b);

        room.broadcast_except(&ServerEnvelope::user_joined("lobby", "bob"), a.id());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_survives_closed_member() {
        let mut room = Room::new("lobby", "alice", Vec::new());
        let (a, rx_a) = member("alice");
        let (b, mut rx_b) = member("bob");
        room.add_member(a);
        room.add_member(b);
        drop(rx_a);

        room.broadcast(&ServerEnvelope::system(Some("lobby"), "hi"));
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_moderation_action_parse() {
        assert_eq!("mute".parse(), Ok(ModerationAction::Mute));
        assert_eq!("kick".parse(), Ok(ModerationAction::Kick));
        assert_eq!("promote".parse(), Ok(ModerationAction::Promote));
        assert!("banish".parse::<ModerationAction>().is_err());
        assert!("MUTE".parse::<ModerationAction>().is_err());
    }
}
