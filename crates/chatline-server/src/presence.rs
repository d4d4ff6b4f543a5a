//! Online/offline fan-out.

use std::collections::VecDeque;
use std::sync::Arc;

use chatline_core::{Envelope, PresenceStatus, UserId};
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::metrics::{PRESENCE_ANNOUNCEMENTS_TOTAL, WS_EVICTIONS_TOTAL};
use crate::registry::{Admission, Session, SessionRegistry};
use crate::websocket::connection::ConnectionHandle;

/// Announces presence changes to every other live session.
///
/// Each registry transition and its announcement run under one lock, so
/// every peer observes a user's online/offline events in the order the
/// registry applied them. Sends only enqueue, so the lock is never held
/// across socket I/O.
pub struct PresenceBroadcaster {
    registry: Arc<SessionRegistry>,
    transitions: Mutex<()>,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            transitions: Mutex::new(()),
        }
    }

    /// Admit `handle` for `user_id` and announce it online.
    ///
    /// A reconnect over a live session is a supersede: nothing is announced.
    /// Returns `None` when a new user would exceed `max_sessions`.
    pub fn admit(
        &self,
        user_id: UserId,
        handle: Arc<ConnectionHandle>,
        max_sessions: usize,
    ) -> Option<Admission> {
        let _transition = self.transitions.lock();
        let admission = self.registry.admit_within(user_id, handle, max_sessions)?;
        if admission.superseded.is_none() {
            let _ = self.announce(user_id, PresenceStatus::Online);
        }
        Some(admission)
    }

    /// Remove `session` if it is still current and announce the user offline.
    ///
    /// Returns `false` when the session was already gone or superseded; no
    /// announcement is made then, so each lifetime produces one offline.
    pub fn evict(&self, session: &Session) -> bool {
        let _transition = self.transitions.lock();
        if !self.registry.remove_session(session) {
            return false;
        }
        let _ = self.announce(session.user_id(), PresenceStatus::Offline);
        true
    }

    /// Send a `status` envelope for `user_id` to every session except the
    /// user's own. Caller holds `transitions`.
    ///
    /// Peers whose send fails are evicted and announced offline in turn.
    /// Returns the number of envelopes delivered across the whole cascade.
    #[instrument(skip_all, fields(user_id = %user_id, status = status.as_str()))]
    fn announce(&self, user_id: UserId, status: PresenceStatus) -> usize {
        let mut pending = VecDeque::from([(user_id, status)]);
        let mut delivered = 0;

        while let Some((subject, status)) = pending.pop_front() {
            counter!(PRESENCE_ANNOUNCEMENTS_TOTAL, "status" => status.as_str()).increment(1);
            let envelope = Envelope::status(subject, status);

            for (peer, session) in self.registry.all_sessions() {
                if peer == subject {
                    continue;
                }
                if session.send(&envelope) {
                    delivered += 1;
                } else if self.registry.remove_session(&session) {
                    debug!(%peer, "presence send failed, evicting");
                    counter!(WS_EVICTIONS_TOTAL).increment(1);
                    pending.push_back((peer, PresenceStatus::Offline));
                }
            }
        }
        delivered
    }
}
