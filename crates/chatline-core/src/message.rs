//! The persisted chat record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Closed set of chat message kinds.
///
/// Serialized upper-case on the wire (`"TEXT"`), stored lower-case in the
/// database (`"text"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Text,
    Voice,
    Video,
    Image,
}

impl MessageType {
    /// Wire representation.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Voice => "VOICE",
            Self::Video => "VIDEO",
            Self::Image => "IMAGE",
        }
    }

    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Image => "image",
        }
    }

    /// Whether `content` is a reference to uploaded media rather than text.
    pub fn is_media(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Case-insensitive; accepts both the wire and the storage spelling.
impl FromStr for MessageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            _ => Err(format!("unknown message type: {s}")),
        }
    }
}

/// A message as handed to the storage collaborator, before it has an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message_type: MessageType,
    pub content: String,
}

/// A durable chat record. Never mutated once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message_type: MessageType,
    pub content: String,
    /// Storage reference for media-bearing types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("TEXT".parse::<MessageType>(), Ok(MessageType::Text));
        assert_eq!("voice".parse::<MessageType>(), Ok(MessageType::Voice));
        assert_eq!("Video".parse::<MessageType>(), Ok(MessageType::Video));
        assert_eq!("image".parse::<MessageType>(), Ok(MessageType::Image));
        assert!("sticker".parse::<MessageType>().is_err());
    }

    #[test]
    fn wire_and_storage_spelling() {
        assert_eq!(MessageType::Voice.wire_name(), "VOICE");
        assert_eq!(MessageType::Voice.as_str(), "voice");
        assert_eq!(
            serde_json::to_value(MessageType::Video).unwrap(),
            serde_json::json!("VIDEO")
        );
    }

    #[test]
    fn only_text_is_not_media() {
        assert!(!MessageType::Text.is_media());
        assert!(MessageType::Voice.is_media());
        assert!(MessageType::Video.is_media());
        assert!(MessageType::Image.is_media());
    }
}
