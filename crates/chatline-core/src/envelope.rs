//! Outbound wire units. Built per delivery and discarded after the send
//! attempt; never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::message::{Message, MessageType};

/// Presence state announced to other users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// A typed message pushed over a live connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// A stored chat message (sender confirmation or receiver notification).
    Message {
        id: i64,
        from_user: UserId,
        to_user: UserId,
        content: String,
        message_type: MessageType,
        timestamp: DateTime<Utc>,
    },
    /// Presence change of `user_id`.
    Status {
        user_id: UserId,
        status: PresenceStatus,
        timestamp: DateTime<Utc>,
    },
    /// A frame from this connection could not be processed.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// Opaque peer-to-peer negotiation payload, relayed to `to_user` only.
    WebrtcSignal {
        from_user: UserId,
        to_user: UserId,
        signal: serde_json::Value,
    },
}

impl Envelope {
    /// Chat envelope for a stored message. The timestamp is the storage
    /// `created_at`, never a client-supplied clock.
    pub fn chat(message: &Message) -> Self {
        Self::Message {
            id: message.id,
            from_user: message.sender_id,
            to_user: message.receiver_id,
            content: message.content.clone(),
            message_type: message.message_type,
            timestamp: message.created_at,
        }
    }

    /// Presence envelope timestamped now.
    pub fn status(user_id: UserId, status: PresenceStatus) -> Self {
        Self::Status {
            user_id,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }

    pub fn signal(from_user: UserId, to_user: UserId, signal: serde_json::Value) -> Self {
        Self::WebrtcSignal {
            from_user,
            to_user,
            signal,
        }
    }

    /// Value of the `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::WebrtcSignal { .. } => "webrtc-signal",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn stored() -> Message {
        Message {
            id: 11,
            sender_id: UserId::new(1),
            receiver_id: UserId::new(2),
            message_type: MessageType::Text,
            content: "hi".into(),
            media_file: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn chat_envelope_shape() {
        let v: Value = serde_json::from_str(&Envelope::chat(&stored()).to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["id"], 11);
        assert_eq!(v["from_user"], 1);
        assert_eq!(v["to_user"], 2);
        assert_eq!(v["content"], "hi");
        assert_eq!(v["message_type"], "TEXT");
        assert_eq!(v["timestamp"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn chat_envelope_uses_storage_timestamp() {
        let msg = stored();
        let Envelope::Message { timestamp, .. } = Envelope::chat(&msg) else {
            panic!("expected message envelope");
        };
        assert_eq!(timestamp, msg.created_at);
    }

    #[test]
    fn status_envelope_shape() {
        let v = serde_json::to_value(Envelope::status(UserId::new(5), PresenceStatus::Offline)).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(v["user_id"], 5);
        assert_eq!(v["status"], "offline");
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn error_envelope_omits_missing_details() {
        let v = serde_json::to_value(Envelope::error("Malformed frame", None)).unwrap();
        assert_eq!(v, json!({"type": "error", "message": "Malformed frame"}));

        let v = serde_json::to_value(Envelope::error("x", Some("y".into()))).unwrap();
        assert_eq!(v["details"], "y");
    }

    #[test]
    fn signal_envelope_passes_payload_through() {
        let payload = json!({"sdp": "v=0", "candidates": [1, 2]});
        let env = Envelope::signal(UserId::new(1), UserId::new(9), payload.clone());
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "webrtc-signal");
        assert_eq!(env.kind(), "webrtc-signal");
        assert_eq!(v["from_user"], 1);
        assert_eq!(v["to_user"], 9);
        assert_eq!(v["signal"], payload);
    }
}
