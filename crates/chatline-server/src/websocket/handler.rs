//! Per-frame processing. Every failure stops here and becomes an `error`
//! envelope for the originating connection.

use chatline_core::{ClassificationError, Envelope, UserId};
use metrics::counter;
use tracing::{debug, instrument};

use crate::ingest::{build_chat_envelopes, classify, ClassifiedFrame, IngestError, IngestPipeline};
use crate::metrics::FRAME_ERRORS_TOTAL;
use crate::router::DeliveryRouter;

/// Process one inbound text frame from `sender`.
///
/// Returns the error envelope to send back, or `None` when the frame was
/// handled (delivery outcomes are not reported to the sender).
#[instrument(skip_all, fields(sender = %sender, kind))]
pub async fn handle_frame(
    raw: &str,
    sender: UserId,
    ingest: &IngestPipeline,
    router: &DeliveryRouter,
) -> Option<Envelope> {
    let frame = match classify(raw) {
        Ok(frame) => frame,
        Err(e) => return Some(classification_error(&e)),
    };
    let _ = tracing::Span::current().record("kind", frame.kind());

    match frame {
        ClassifiedFrame::Chat(chat) => match ingest.ingest_chat(chat, sender).await {
            Ok(message) => {
                let (to_sender, to_receiver) = build_chat_envelopes(&message);
                let _ = router.deliver_chat(&message, &to_sender, &to_receiver);
                None
            }
            Err(IngestError::Classification(e)) => Some(classification_error(&e)),
            Err(IngestError::Storage(e)) => {
                counter!(FRAME_ERRORS_TOTAL, "kind" => "storage").increment(1);
                Some(Envelope::error("Failed to store message", Some(e.to_string())))
            }
        },
        ClassifiedFrame::Signal(signal) => {
            let result = router.relay_signal(sender, signal.target_id, signal.signal);
            debug!(target = %signal.target_id, result = result.as_str(), "signal relayed");
            None
        }
    }
}

/// Error envelope for a frame that could not be classified or was
/// missing a required field.
pub fn classification_error(error: &ClassificationError) -> Envelope {
    counter!(FRAME_ERRORS_TOTAL, "kind" => error.kind()).increment(1);
    debug!(error = %error, "rejecting frame");
    match error {
        ClassificationError::UnsupportedType(_) => Envelope::error(error.to_string(), None),
        ClassificationError::MalformedFrame(detail) => {
            Envelope::error("Malformed frame", Some(detail.clone()))
        }
        ClassificationError::MissingField(_) => {
            Envelope::error("Failed to send message", Some(error.to_string()))
        }
    }
}
