use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::signaling::ServerMessage;

/// Identity of one live WebSocket, minted when the transport accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Send half of a session, owned by the transport.
///
/// The channel is unbounded so that a send never stalls the relay lock.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionHandle {
    pub fn new(id: SessionId, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { id, tx }
    }

    /// Fire-and-forget; a closed socket is only logged.
    pub fn send(&self, message: ServerMessage) {
        if self.tx.send(message).is_err() {
            debug!(session = %self.id, "dropping message for closed session");
        }
    }
}

struct SessionEntry {
    handle: SessionHandle,
    connection_ids: HashSet<String>,
}

/// Live sessions and the connection ids each one takes part in.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionEntry>,
}

impl SessionRegistry {
    pub fn add(&mut self, handle: SessionHandle) {
        self.sessions.insert(
            handle.id,
            SessionEntry {
                handle,
                connection_ids: HashSet::new(),
            },
        );
    }

    /// Drop a session, handing back the connection ids it still owned.
    pub fn remove(&mut self, session: SessionId) -> Option<HashSet<String>> {
        self.sessions
            .remove(&session)
            .map(|entry| entry.connection_ids)
    }

    #[cfg(test)]
    pub fn contains(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    /// Record `connection_id` for a session; unknown sessions are ignored.
    pub fn claim(&mut self, session: SessionId, connection_id: &str) {
        if let Some(entry) = self.sessions.get_mut(&session) {
            entry.connection_ids.insert(connection_id.to_string());
        }
    }

    pub fn release(&mut self, session: SessionId, connection_id: &str) {
        if let Some(entry) = self.sessions.get_mut(&session) {
            entry.connection_ids.remove(connection_id);
        }
    }

    #[cfg(test)]
    pub fn connection_ids(&self, session: SessionId) -> Option<&HashSet<String>> {
        self.sessions
            .get(&session)
            .map(|entry| &entry.connection_ids)
    }

    pub fn send(&self, session: SessionId, message: ServerMessage) {
        match self.sessions.get(&session) {
            Some(entry) => entry.handle.send(message),
            None => debug!(%session, "send to unregistered session skipped"),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Sessions that identified themselves as browsers by sending `connect`.
///
/// Everything else is a worker.
#[derive(Debug, Default)]
pub struct RoleSet {
    browsers: HashSet<SessionId>,
}

impl RoleSet {
    pub fn mark_browser(&mut self, session: SessionId) {
        self.browsers.insert(session);
    }

    pub fn is_browser(&self, session: SessionId) -> bool {
        self.browsers.contains(&session)
    }

    pub fn forget(&mut self, session: SessionId) {
        self.browsers.remove(&session);
    }

    pub fn browser_count(&self) -> usize {
        self.browsers.len()
    }
}
