//! Idle-connection reaping.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ConnectionHandle;

/// Outcome of the idle monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Nothing was received for `idle_timeout`; the handle was closed.
    TimedOut,
    /// The connection closed or the monitor was cancelled first.
    Cancelled,
}

/// Close `connection` once it has received nothing for `idle_timeout`.
///
/// Pongs count as activity, so a client answering the server's Pings is
/// never reaped. Checks run at a quarter of the timeout.
pub async fn run_idle_monitor(
    connection: Arc<ConnectionHandle>,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check = time::interval((idle_timeout / 4).max(Duration::from_millis(10)));
    let closed = connection.closed_token();

    loop {
        tokio::select! {
            _ = check.tick() => {
                if connection.idle_for() >= idle_timeout {
                    tracing::info!(
                        connection_id = %connection.id(),
                        idle_secs = idle_timeout.as_secs(),
                        "closing idle connection"
                    );
                    connection.close();
                    return HeartbeatResult::TimedOut;
                }
            }
            () = closed.cancelled() => return HeartbeatResult::Cancelled,
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}
