//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"shutting_down"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections, including superseded ones still closing.
    pub connections: usize,
    /// Users with a registered session.
    pub online_users: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    online_users: usize,
    shutting_down: bool,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        online_users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, 0, false);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn reports_shutdown() {
        assert_eq!(health_check(Instant::now(), 0, 0, true).status, "shutting_down");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, 0, false).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), 3, 2, false);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 3);
        assert_eq!(parsed["online_users"], 2);
        assert!(parsed["uptime_secs"].is_number());
    }
}
