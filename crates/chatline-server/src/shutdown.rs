//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::SessionRegistry;

/// Shared stop signal for the HTTP listener and every session task.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the token; cancelled once shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, close every live session, then wait up to `timeout`
    /// for `handles` to finish. Tasks still running afterwards are aborted.
    pub async fn graceful_shutdown(
        &self,
        registry: &SessionRegistry,
        handles: Vec<JoinHandle<()>>,
        timeout: Duration,
    ) {
        self.shutdown();
        let closed = registry.close_all();
        info!(
            sessions = closed,
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "shutting down"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ConnectionHandle;
    use chatline_core::UserId;
    use std::sync::Arc;

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled() && t2.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_sessions_and_awaits_tasks() {
        let coord = ShutdownCoordinator::new();
        let registry = SessionRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(4);
        let handle = Arc::new(handle);
        let _ = registry.admit(UserId::new(1), handle.clone());

        let token = coord.token();
        let task = tokio::spawn(async move { token.cancelled().await });

        coord
            .graceful_shutdown(&registry, vec![task], Duration::from_secs(5))
            .await;
        assert!(registry.is_empty());
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_tasks_are_aborted_after_timeout() {
        let coord = ShutdownCoordinator::new();
        let registry = SessionRegistry::new();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        coord
            .graceful_shutdown(&registry, vec![task], Duration::from_millis(100))
            .await;
        assert!(coord.is_shutting_down());
    }
}
