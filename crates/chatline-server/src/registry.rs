//! Process-wide map from user identity to its single live session.

use std::collections::HashMap;
use std::sync::Arc;

use chatline_core::{ConnectionId, Envelope, PresenceStatus, UserId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::websocket::connection::ConnectionHandle;

/// One live connection bound to one user. Never mutated after admission;
/// a reconnect replaces the whole session.
pub struct Session {
    user_id: UserId,
    handle: Arc<ConnectionHandle>,
    connected_at: DateTime<Utc>,
    status: PresenceStatus,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        self.handle.id()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Single delivery attempt. `false` means the connection is unusable.
    pub fn send(&self, envelope: &Envelope) -> bool {
        self.handle.send(envelope)
    }

    fn is_same_connection(&self, other: &Session) -> bool {
        self.connection_id() == other.connection_id()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("connection_id", self.connection_id())
            .field("connected_at", &self.connected_at)
            .field("status", &self.status)
            .finish()
    }
}

/// Outcome of [`SessionRegistry::admit`].
#[derive(Debug)]
pub struct Admission {
    /// The newly registered session.
    pub session: Arc<Session>,
    /// The prior session for the same user, already closed. `None` on a
    /// fresh connect.
    pub superseded: Option<Arc<Session>>,
}

/// Session registry. Every operation takes the lock once and never holds
/// it across an await or a send.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the only live session for `user_id`.
    ///
    /// Any prior session for the user is removed in the same critical
    /// section and its handle closed, so it receives no further sends.
    pub fn admit(&self, user_id: UserId, handle: Arc<ConnectionHandle>) -> Admission {
        let mut sessions = self.sessions.write();
        Self::insert(&mut sessions, user_id, handle)
    }

    /// Like [`admit`](Self::admit), but refuses a new user once `limit`
    /// sessions exist. A reconnect replaces a session and is always admitted.
    pub fn admit_within(
        &self,
        user_id: UserId,
        handle: Arc<ConnectionHandle>,
        limit: usize,
    ) -> Option<Admission> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= limit && !sessions.contains_key(&user_id) {
            return None;
        }
        Some(Self::insert(&mut sessions, user_id, handle))
    }

    fn insert(
        sessions: &mut HashMap<UserId, Arc<Session>>,
        user_id: UserId,
        handle: Arc<ConnectionHandle>,
    ) -> Admission {
        let session = Arc::new(Session {
            user_id,
            handle,
            connected_at: Utc::now(),
            status: PresenceStatus::Online,
        });
        let superseded = sessions.insert(user_id, session.clone());

        if let Some(old) = &superseded {
            old.handle.close();
            info!(
                %user_id,
                old_connection = %old.connection_id(),
                new_connection = %session.connection_id(),
                "superseded prior session"
            );
        } else {
            debug!(%user_id, connection_id = %session.connection_id(), "session admitted");
        }

        Admission { session, superseded }
    }

    /// Remove whatever session `user_id` has. Idempotent: returns `false`
    /// and changes nothing when absent.
    pub fn remove(&self, user_id: UserId) -> bool {
        let removed = self.sessions.write().remove(&user_id);
        match removed {
            Some(session) => {
                session.handle.close();
                true
            }
            None => false,
        }
    }

    /// Remove `session` only if it is still the registered one for its user.
    ///
    /// A superseded connection winding down must not evict its replacement.
    pub fn remove_session(&self, session: &Session) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            let is_current = sessions
                .get(&session.user_id)
                .is_some_and(|current| current.is_same_connection(session));
            if is_current {
                sessions.remove(&session.user_id)
            } else {
                None
            }
        };
        match removed {
            Some(current) => {
                current.handle.close();
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, user_id: UserId) -> Option<Arc<Session>> {
        self.sessions.read().get(&user_id).cloned()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.sessions.read().contains_key(&user_id)
    }

    /// Point-in-time copy of every session. Safe to iterate while other
    /// tasks admit or remove.
    pub fn all_sessions(&self) -> Vec<(UserId, Arc<Session>)> {
        self.sessions
            .read()
            .iter()
            .map(|(user_id, session)| (*user_id, session.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Close and drop every session. Used at shutdown; no presence is announced.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.handle.close();
        }
        drained.len()
    }
}
