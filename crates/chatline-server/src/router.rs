//! Delivery of envelopes to live sessions.

use std::sync::Arc;

use chatline_core::{Envelope, Message, UserId};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::metrics::{DELIVERIES_TOTAL, SIGNALS_RELAYED_TOTAL, WS_EVICTIONS_TOTAL};
use crate::presence::PresenceBroadcaster;
use crate::registry::SessionRegistry;

/// Outcome of one delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// Recipient offline. Not an error.
    NoSession,
    /// Send failed; the session was evicted and announced offline.
    Failed,
}

impl DeliveryResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::NoSession => "no_session",
            Self::Failed => "failed",
        }
    }
}

/// Results of the two independent legs of a chat delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatDelivery {
    pub sender: DeliveryResult,
    pub receiver: DeliveryResult,
}

/// At-most-once delivery: one attempt per envelope per target, no queueing.
pub struct DeliveryRouter {
    registry: Arc<SessionRegistry>,
    presence: Arc<PresenceBroadcaster>,
}

impl DeliveryRouter {
    pub fn new(registry: Arc<SessionRegistry>, presence: Arc<PresenceBroadcaster>) -> Self {
        Self { registry, presence }
    }

    pub fn deliver_to_user(&self, user_id: UserId, envelope: &Envelope) -> DeliveryResult {
        let result = match self.registry.lookup(user_id) {
            None => DeliveryResult::NoSession,
            Some(session) if session.send(envelope) => DeliveryResult::Delivered,
            Some(session) => {
                debug!(%user_id, kind = envelope.kind(), "send failed, evicting session");
                if self.presence.evict(&session) {
                    counter!(WS_EVICTIONS_TOTAL).increment(1);
                }
                DeliveryResult::Failed
            }
        };
        counter!(DELIVERIES_TOTAL, "result" => result.as_str()).increment(1);
        result
    }

    /// Confirmation to the sender and notification to the receiver. The
    /// legs are independent: one failing does not affect the other.
    #[instrument(skip_all, fields(message_id = message.id))]
    pub fn deliver_chat(
        &self,
        message: &Message,
        sender_envelope: &Envelope,
        receiver_envelope: &Envelope,
    ) -> ChatDelivery {
        let sender = self.deliver_to_user(message.sender_id, sender_envelope);
        let receiver = self.deliver_to_user(message.receiver_id, receiver_envelope);
        debug!(
            sender = sender.as_str(),
            receiver = receiver.as_str(),
            "chat delivered"
        );
        ChatDelivery { sender, receiver }
    }

    /// Forward a signaling payload to `to_user` only. The sender gets no echo.
    pub fn relay_signal(&self, from_user: UserId, to_user: UserId, signal: Value) -> DeliveryResult {
        let envelope = Envelope::signal(from_user, to_user, signal);
        let result = self.deliver_to_user(to_user, &envelope);
        counter!(SIGNALS_RELAYED_TOTAL, "result" => result.as_str()).increment(1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ConnectionHandle;
    use chatline_core::MessageType;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<SessionRegistry>,
        router: DeliveryRouter,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SessionRegistry::new());
        let presence = Arc::new(PresenceBroadcaster::new(registry.clone()));
        let router = DeliveryRouter::new(registry.clone(), presence);
        Fixture { registry, router }
    }

    fn connect(reg: &SessionRegistry, n: i64) -> mpsc::Receiver<String> {
        let (h, rx) = ConnectionHandle::channel(8);
        let _ = reg.admit(UserId::new(n), Arc::new(h));
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn stored(id: i64, from: i64, to: i64) -> Message {
        Message {
            id,
            sender_id: UserId::new(from),
            receiver_id: UserId::new(to),
            message_type: MessageType::Text,
            content: "hi".into(),
            media_file: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn offline_target_is_no_session() {
        let f = fixture();
        let result = f
            .router
            .deliver_to_user(UserId::new(9), &Envelope::error("x", None));
        assert_eq!(result, DeliveryResult::NoSession);
    }

    #[test]
    fn delivered_to_online_target() {
        let f = fixture();
        let mut rx = connect(&f.registry, 2);
        let result = f
            .router
            .deliver_to_user(UserId::new(2), &Envelope::error("x", None));
        assert_eq!(result, DeliveryResult::Delivered);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn failed_send_evicts_and_broadcasts_offline() {
        let f = fixture();
        let dead = connect(&f.registry, 2);
        let mut watcher = connect(&f.registry, 3);
        drop(dead);

        let result = f
            .router
            .deliver_to_user(UserId::new(2), &Envelope::error("x", None));
        assert_eq!(result, DeliveryResult::Failed);
        assert!(!f.registry.is_online(UserId::new(2)));

        let seen = drain(&mut watcher);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["type"], "status");
        assert_eq!(seen[0]["user_id"], 2);
        assert_eq!(seen[0]["status"], "offline");
    }

    #[test]
    fn chat_reaches_both_parties_with_matching_id() {
        let f = fixture();
        let mut rx1 = connect(&f.registry, 1);
        let mut rx2 = connect(&f.registry, 2);
        let msg = stored(10, 1, 2);
        let env = Envelope::chat(&msg);

        let outcome = f.router.deliver_chat(&msg, &env, &env);
        assert_eq!(outcome.sender, DeliveryResult::Delivered);
        assert_eq!(outcome.receiver, DeliveryResult::Delivered);

        let to_sender = drain(&mut rx1);
        let to_receiver = drain(&mut rx2);
        assert_eq!(to_sender.len(), 1);
        assert_eq!(to_receiver.len(), 1);
        assert_eq!(to_sender[0]["id"], to_receiver[0]["id"]);
        assert_eq!(to_sender[0]["timestamp"], to_receiver[0]["timestamp"]);
    }

    #[test]
    fn chat_to_offline_receiver_still_confirms_sender() {
        let f = fixture();
        let mut rx1 = connect(&f.registry, 1);
        let msg = stored(11, 1, 2);
        let env = Envelope::chat(&msg);

        let outcome = f.router.deliver_chat(&msg, &env, &env);
        assert_eq!(outcome.sender, DeliveryResult::Delivered);
        assert_eq!(outcome.receiver, DeliveryResult::NoSession);
        assert_eq!(drain(&mut rx1).len(), 1);
    }

    #[test]
    fn failed_sender_leg_does_not_block_receiver() {
        let f = fixture();
        drop(connect(&f.registry, 1));
        let mut rx2 = connect(&f.registry, 2);
        let msg = stored(12, 1, 2);
        let env = Envelope::chat(&msg);

        let outcome = f.router.deliver_chat(&msg, &env, &env);
        assert_eq!(outcome.sender, DeliveryResult::Failed);
        assert_eq!(outcome.receiver, DeliveryResult::Delivered);

        let seen = drain(&mut rx2);
        assert!(seen.iter().any(|e| e["type"] == "message"));
        assert!(seen.iter().any(|e| e["type"] == "status" && e["status"] == "offline"));
    }

    #[test]
    fn signal_goes_to_target_only() {
        let f = fixture();
        let mut rx1 = connect(&f.registry, 1);
        let mut rx2 = connect(&f.registry, 2);
        let payload = serde_json::json!({"sdp": "v=0", "kind": "offer"});

        let result = f
            .router
            .relay_signal(UserId::new(1), UserId::new(2), payload.clone());
        assert_eq!(result, DeliveryResult::Delivered);
        assert!(drain(&mut rx1).is_empty());

        let seen = drain(&mut rx2);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["type"], "webrtc-signal");
        assert_eq!(seen[0]["from_user"], 1);
        assert_eq!(seen[0]["to_user"], 2);
        assert_eq!(seen[0]["signal"], payload);
    }
}
