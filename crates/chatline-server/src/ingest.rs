//! Inbound frame classification and chat persistence.
//!
//! Accepted frames:
//!
//! ```text
//! { "target_id": 2, "content": "hi", "message_type"?: "TEXT" | "VOICE" | "VIDEO" }
//! { "type": "message", ... }                  same as above
//! { "type": "webrtc-signal", "target_id": 2, "signal": <any> }
//! ```

use std::sync::Arc;

use chatline_core::{
    ClassificationError, Envelope, Message, MessageStore, MessageType, NewMessage, StorageError,
    UserId,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::metrics::MESSAGES_PERSISTED_TOTAL;

/// Chat kinds accepted over a live connection. Image messages are only
/// created through the upload path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Text,
    Voice,
    Video,
}

impl From<ChatKind> for MessageType {
    fn from(kind: ChatKind) -> Self {
        match kind {
            ChatKind::Text => Self::Text,
            ChatKind::Voice => Self::Voice,
            ChatKind::Video => Self::Video,
        }
    }
}

/// A chat frame as received. Required fields are checked by
/// [`IngestPipeline::ingest_chat`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChatFrame {
    pub kind: ChatKind,
    pub target_id: Option<UserId>,
    pub content: Option<String>,
}

/// Peer-to-peer negotiation payload, relayed untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalFrame {
    pub target_id: UserId,
    pub signal: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClassifiedFrame {
    Chat(ChatFrame),
    Signal(SignalFrame),
}

impl ClassifiedFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "message",
            Self::Signal(_) => "webrtc-signal",
        }
    }
}

/// Why a chat frame produced no stored message.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Just the discriminator; the body is decoded once the kind is known.
#[derive(Deserialize)]
struct FrameHeader {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct InboundChat {
    target_id: Option<UserId>,
    content: Option<String>,
    message_type: Option<String>,
}

#[derive(Deserialize)]
struct InboundSignal {
    target_id: Option<UserId>,
    #[serde(default)]
    signal: Value,
}

fn malformed(e: &serde_json::Error) -> ClassificationError {
    ClassificationError::MalformedFrame(e.to_string())
}

/// Decode one text frame into a routable unit.
///
/// A frame without `type` is a chat message.
pub fn classify(raw: &str) -> Result<ClassifiedFrame, ClassificationError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| malformed(&e))?;
    if !value.is_object() {
        return Err(ClassificationError::MalformedFrame(
            "expected a JSON object".into(),
        ));
    }

    let header = FrameHeader::deserialize(&value).map_err(|e| malformed(&e))?;
    match header.kind.as_deref().unwrap_or("message") {
        "message" => {
            let chat = InboundChat::deserialize(&value).map_err(|e| malformed(&e))?;
            chat.try_into().map(ClassifiedFrame::Chat)
        }
        "webrtc-signal" => {
            let signal = InboundSignal::deserialize(&value).map_err(|e| malformed(&e))?;
            signal.try_into().map(ClassifiedFrame::Signal)
        }
        other => Err(ClassificationError::UnsupportedType(other.to_string())),
    }
}

impl TryFrom<InboundChat> for ChatFrame {
    type Error = ClassificationError;

    fn try_from(chat: InboundChat) -> Result<Self, Self::Error> {
        let kind = match chat.message_type {
            None => ChatKind::Text,
            Some(raw) => match raw.parse::<MessageType>() {
                Ok(MessageType::Text) => ChatKind::Text,
                Ok(MessageType::Voice) => ChatKind::Voice,
                Ok(MessageType::Video) => ChatKind::Video,
                Ok(MessageType::Image) | Err(_) => {
                    return Err(ClassificationError::UnsupportedType(raw));
                }
            },
        };
        Ok(Self {
            kind,
            target_id: chat.target_id,
            content: chat.content,
        })
    }
}

impl TryFrom<InboundSignal> for SignalFrame {
    type Error = ClassificationError;

    fn try_from(signal: InboundSignal) -> Result<Self, Self::Error> {
        let target_id = signal
            .target_id
            .ok_or(ClassificationError::MissingField("target_id"))?;
        Ok(Self {
            target_id,
            signal: signal.signal,
        })
    }
}

/// Sender confirmation and receiver notification for a stored message.
///
/// Both carry the storage-assigned id and `created_at`.
pub fn build_chat_envelopes(message: &Message) -> (Envelope, Envelope) {
    (Envelope::chat(message), Envelope::chat(message))
}

/// Validates chat frames and persists them through the storage collaborator.
pub struct IngestPipeline {
    store: Arc<dyn MessageStore>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Persist one chat frame sent by `sender`.
    ///
    /// Nothing is stored when a required field is missing, and a storage
    /// failure leaves nothing behind for the caller to deliver.
    #[instrument(skip_all, fields(sender = %sender))]
    pub async fn ingest_chat(&self, frame: ChatFrame, sender: UserId) -> Result<Message, IngestError> {
        let receiver_id = frame
            .target_id
            .ok_or(ClassificationError::MissingField("target_id"))?;
        let content = frame
            .content
            .ok_or(ClassificationError::MissingField("content"))?;
        let message_type = MessageType::from(frame.kind);

        let message = self
            .store
            .persist_message(NewMessage {
                sender_id: sender,
                receiver_id,
                message_type,
                content,
            })
            .await
            .inspect_err(|e| warn!(error = %e, "failed to persist message"))?;

        counter!(MESSAGES_PERSISTED_TOTAL, "message_type" => message_type.as_str()).increment(1);
        debug!(message_id = message.id, receiver = %receiver_id, "message persisted");
        Ok(message)
    }
}
