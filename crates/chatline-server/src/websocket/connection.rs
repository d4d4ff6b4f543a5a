//! Send side of a live WebSocket connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatline_core::{ConnectionId, Envelope};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle used by other tasks to push frames to one connection.
///
/// Sends never block: frames go into a bounded queue drained by the
/// connection's single writer task, which keeps writes serialized.
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
    connected_at: Instant,
    last_activity: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            connected_at: now,
            last_activity: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// New handle with a fresh id plus the receiving end for the writer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionId::new(), tx), rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Serialize and enqueue an envelope.
    ///
    /// Returns `false` if the handle is closed, the writer is gone, or the
    /// queue is full. Callers treat `false` as a failed send.
    pub fn send(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Ok(json) => self.send_text(json),
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "failed to serialize envelope");
                false
            }
        }
    }

    /// Enqueue a pre-serialized frame.
    pub fn send_text(&self, text: String) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                debug!(connection_id = %self.id, "send queue full");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Close the connection. The writer sends a Close frame and the reader
    /// loop exits; later sends fail.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Token cancelled when the handle is closed.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Record inbound activity (any frame, including Pong).
    pub fn mark_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Frames rejected because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::{PresenceStatus, UserId};

    fn status() -> Envelope {
        Envelope::status(UserId::new(7), PresenceStatus::Online)
    }

    #[tokio::test]
    async fn send_serializes_envelope() {
        let (handle, mut rx) = ConnectionHandle::channel(8);
        assert!(handle.send(&status()));
        let text = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["type"], "status");
        assert_eq!(parsed["user_id"], 7);
    }

    #[test]
    fn send_to_dropped_receiver_fails() {
        let (handle, rx) = ConnectionHandle::channel(8);
        drop(rx);
        assert!(!handle.send(&status()));
        assert!(handle.is_closed());
    }

    #[test]
    fn full_queue_fails_and_counts_drop() {
        let (handle, _rx) = ConnectionHandle::channel(1);
        assert!(handle.send_text("one".into()));
        assert!(!handle.send_text("two".into()));
        assert_eq!(handle.drop_count(), 1);
    }

    #[test]
    fn closed_handle_rejects_sends() {
        let (handle, _rx) = ConnectionHandle::channel(8);
        let token = handle.closed_token();
        handle.close();
        assert!(token.is_cancelled());
        assert!(handle.is_closed());
        assert!(!handle.send(&status()));
    }

    #[test]
    fn close_is_idempotent() {
        let (handle, _rx) = ConnectionHandle::channel(8);
        handle.close();
        handle.close();
        assert!(handle.is_closed());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (handle, _rx) = ConnectionHandle::channel(0);
        assert!(handle.send_text("x".into()));
    }

    #[test]
    fn activity_resets_idle_clock() {
        let (handle, _rx) = ConnectionHandle::channel(8);
        std::thread::sleep(Duration::from_millis(20));
        assert!(handle.idle_for() >= Duration::from_millis(20));
        handle.mark_activity();
        assert!(handle.idle_for() < Duration::from_millis(20));
        assert!(handle.age() >= Duration::from_millis(20));
    }

    #[test]
    fn each_handle_gets_a_distinct_id() {
        let (a, _ra) = ConnectionHandle::channel(1);
        let (b, _rb) = ConnectionHandle::channel(1);
        assert_ne!(a.id(), b.id());
    }
}
