//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{home_dir, ChatlineSettings, LogFormat};

/// Resolve the default settings path (`~/.chatline/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".chatline").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChatlineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChatlineSettings> {
    let defaults = serde_json::to_value(ChatlineSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ChatlineSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHATLINE_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value stays.
pub fn apply_env_overrides(settings: &mut ChatlineSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("CHATLINE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("CHATLINE_PORT") {
        match parse_u64_range(&v, 0, u64::from(u16::MAX)) {
            Some(port) => settings.server.port = port as u16,
            None => warn_invalid("CHATLINE_PORT", &v),
        }
    }
    if let Some(v) = read("CHATLINE_MAX_CONNECTIONS") {
        match parse_u64_range(&v, 1, 1_000_000) {
            Some(n) => settings.server.max_connections = n as usize,
            None => warn_invalid("CHATLINE_MAX_CONNECTIONS", &v),
        }
    }
    if let Some(v) = read("CHATLINE_IDLE_TIMEOUT_SECS") {
        match parse_u64_range(&v, 0, 86_400) {
            Some(0) => settings.server.idle_timeout_secs = None,
            Some(n) => settings.server.idle_timeout_secs = Some(n),
            None => warn_invalid("CHATLINE_IDLE_TIMEOUT_SECS", &v),
        }
    }
    if let Some(v) = read("CHATLINE_DB_PATH") {
        settings.storage.database_path = PathBuf::from(v);
    }
    if let Some(v) = read("CHATLINE_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read("CHATLINE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("CHATLINE_LOG_FORMAT") {
        match v.to_ascii_lowercase().as_str() {
            "json" => settings.logging.format = LogFormat::Json,
            "pretty" => settings.logging.format = LogFormat::Pretty,
            _ => warn_invalid("CHATLINE_LOG_FORMAT", &v),
        }
    }
}

fn validate(settings: &ChatlineSettings) -> Result<()> {
    if settings.auth.jwt_secret.is_empty() {
        return Err(SettingsError::InvalidValue("auth.jwt_secret is empty".into()));
    }
    if settings.server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.send_queue_capacity must be at least 1".into(),
        ));
    }
    if settings.server.ping_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.ping_interval_secs must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env override, ignoring");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8000, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_skips_nulls_and_replaces_arrays() {
        let target = serde_json::json!({"a": 1, "list": [1, 2, 3]});
        let source = serde_json::json!({"a": null, "list": [9]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["list"], serde_json::json!([9]));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.server.max_connections, 1024);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"max_connections": 3}, "auth": {"jwt_secret": "s3cret"}}"#)
            .unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.max_connections, 3);
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.auth.jwt_secret, "s3cret");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_settings_from_path(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"auth": {"jwt_secret": ""}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut s = ChatlineSettings::default();
        apply_env_overrides(
            &mut s,
            env(&[
                ("CHATLINE_HOST", "0.0.0.0"),
                ("CHATLINE_PORT", "9100"),
                ("CHATLINE_IDLE_TIMEOUT_SECS", "120"),
                ("CHATLINE_DB_PATH", "/var/lib/chatline/db.sqlite"),
                ("CHATLINE_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 9100);
        assert_eq!(s.server.idle_timeout_secs, Some(120));
        assert_eq!(s.storage.database_path, PathBuf::from("/var/lib/chatline/db.sqlite"));
        assert_eq!(s.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut s = ChatlineSettings::default();
        apply_env_overrides(
            &mut s,
            env(&[
                ("CHATLINE_PORT", "99999"),
                ("CHATLINE_MAX_CONNECTIONS", "lots"),
                ("CHATLINE_LOG_FORMAT", "xml"),
                ("CHATLINE_HOST", ""),
            ]),
        );
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.server.max_connections, 1024);
        assert_eq!(s.logging.format, LogFormat::Pretty);
        assert_eq!(s.server.host, "127.0.0.1");
    }

    #[test]
    fn zero_idle_timeout_disables_reaping() {
        let mut s = ChatlineSettings::default();
        s.server.idle_timeout_secs = Some(60);
        apply_env_overrides(&mut s, env(&[("CHATLINE_IDLE_TIMEOUT_SECS", "0")]));
        assert!(s.server.idle_timeout_secs.is_none());
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
