//! Log subscriber setup shared by the server binary and test harnesses.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "chatline_server" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per line instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from string levels as they appear in settings files.
    ///
    /// Unparseable levels fall back to INFO (default) or are skipped (modules).
    pub fn from_strings(level: &str, module_levels: &[(String, String)], json: bool) -> Self {
        Self {
            log_level: parse_level(level).unwrap_or(Level::INFO),
            module_levels: module_levels
                .iter()
                .filter_map(|(module, lvl)| parse_level(lvl).map(|l| (module.clone(), l)))
                .collect(),
            json,
        }
    }

    /// The `EnvFilter` directive string for this config.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Parse a level name case-insensitively (`"warn"`, `"DEBUG"`, ...).
pub fn parse_level(s: &str) -> Option<Level> {
    s.trim().parse().ok()
}

/// Initialize the global subscriber. Call once at startup.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry().with(fmt_layer).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        assert_eq!(TelemetryConfig::default().filter_directives(), "info");
    }

    #[test]
    fn module_levels_append_directives() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("chatline_server".into(), Level::DEBUG),
                ("chatline_store".into(), Level::TRACE),
            ],
            json: true,
        };
        assert_eq!(
            config.filter_directives(),
            "warn,chatline_server=debug,chatline_store=trace"
        );
    }

    #[test]
    fn from_strings_skips_bad_levels() {
        let modules = vec![
            ("chatline_server".to_string(), "debug".to_string()),
            ("noisy".to_string(), "loud".to_string()),
        ];
        let config = TelemetryConfig::from_strings("nonsense", &modules, false);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.module_levels, vec![("chatline_server".to_string(), Level::DEBUG)]);
    }

    #[test]
    fn parse_level_is_case_insensitive() {
        assert_eq!(parse_level("ERROR"), Some(Level::ERROR));
        assert_eq!(parse_level(" warn "), Some(Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn second_init_reports_false() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(!init_telemetry(&config));
    }
}
