//! Settings schema. Every section defaults field-by-field, so a partial
//! file only needs the keys it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatlineSettings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

/// Network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` auto-assigns).
    pub port: u16,
    /// Live sessions accepted before new upgrades are refused.
    pub max_connections: usize,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Largest inbound frame in bytes.
    pub max_message_size: usize,
    /// Interval between server Ping frames.
    pub ping_interval_secs: u64,
    /// Close connections silent for this long. `None` disables reaping.
    pub idle_timeout_secs: Option<u64>,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            max_connections: 1024,
            send_queue_capacity: 256,
            max_message_size: 1024 * 1024,
            ping_interval_secs: 30,
            idle_timeout_secs: None,
            shutdown_timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: home_dir().join(".chatline").join("chatline.db"),
        }
    }
}

/// JWT verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HMAC secret shared with the token issuer.
    pub jwt_secret: String,
    /// Clock skew tolerated on `exp`.
    pub leeway_secs: u64,
    /// Lifetime of tokens minted by `chatline token`.
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".into(),
            leeway_secs: 30,
            token_ttl_secs: 30 * 60,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
    /// Per-module overrides, e.g. `("chatline_server", "debug")`.
    pub module_levels: Vec<(String, String)>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            module_levels: Vec::new(),
        }
    }
}

pub(crate) fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
