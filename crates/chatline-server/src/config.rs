//! Server configuration.

use std::time::Duration;

/// Runtime configuration for [`crate::server::ChatServer`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Live sessions accepted before new users are refused with 503.
    pub max_connections: usize,
    /// Outbound queue depth per connection. A full queue counts as a failed send.
    pub send_queue_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between server Ping frames.
    pub ping_interval: Duration,
    /// Close connections that send nothing for this long.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on draining tasks at shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            send_queue_capacity: 256,
            max_message_size: 1024 * 1024,
            ping_interval: Duration::from_secs(30),
            idle_timeout: None,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.max_connections, 1024);
        assert!(cfg.idle_timeout.is_none());
        assert_eq!(cfg.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8000,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8000");
    }
}
