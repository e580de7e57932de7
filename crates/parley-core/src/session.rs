//! Per-connection session state.
//!
//! A [`Session`] is created when a connection opens and destroyed when it
//! closes. It carries the connection's self-asserted identity and the set of
//! rooms it currently occupies, plus the outbound channel back to the
//! connection task.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use parley_protocol::ServerEnvelope;
use tokio::sync::mpsc;
use tracing::trace;

/// Process-unique session identifier.
pub type SessionId = u64;

/// Counter for allocating session IDs.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// One connection's live state.
#[derive(Debug)]
pub struct Session {
    /// Unique session ID.
    id: SessionId,
    /// Self-asserted identity, unset until the first create/join claims it.
    identity: RwLock<Option<String>>,
    /// Names of rooms this session is currently a member of.
    rooms: Mutex<HashSet<String>>,
    /// Outbound channel to the connection task.
    outbound: mpsc::UnboundedSender<ServerEnvelope>,
}

impl Session {
    /// Create a new session with no identity and an empty room set.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<ServerEnvelope>) -> Arc<Self> {
        Arc::new(Self {
            id: SESSION_COUNTER.fetch_add(1, Ordering::Relaxed),
            identity: RwLock::new(None),
            rooms: Mutex::new(HashSet::new()),
            outbound,
        })
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the currently asserted identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.identity.read().unwrap().clone()
    }

    /// Claim (or reassert) an identity from a create/join sender field.
    ///
    /// No uniqueness is enforced across connections; two sessions may share
    /// an identity string.
    pub fn claim_identity(&self, identity: &str) {
        let mut slot = self.identity.write().unwrap();
        if slot.as_deref() != Some(identity) {
            trace!(session = self.id, identity, "identity claimed");
            *slot = Some(identity.to_string());
        }
    }

    /// Snapshot of the rooms this session currently occupies.
    #[must_use]
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.lock().unwrap().iter().cloned().collect()
    }

    /// Check whether the session is tracked as a member of a room.
    #[must_use]
    pub fn in_room(&self, name: &str) -> bool {
        self.rooms.lock().unwrap().contains(name)
    }

    pub(crate) fn track_room(&self, name: &str) {
        self.rooms.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn untrack_room(&self, name: &str) {
        self.rooms.lock().unwrap().remove(name);
    }

    /// Deliver an envelope to this session's connection.
    ///
    /// A no-op once the connection task has gone away; delivery failures are
    /// indistinguishable from a closed connection and are ignored.
    pub fn send(&self, envelope: ServerEnvelope) {
        let _ = self.outbound.send(envelope);
    }
}
