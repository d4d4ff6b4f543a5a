//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Sessions replaced by a reconnect of the same user (counter).
pub const WS_SESSIONS_SUPERSEDED_TOTAL: &str = "ws_sessions_superseded_total";
/// Sessions evicted after a failed send (counter).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// Upgrades refused (counter, labels: reason).
pub const WS_REJECTIONS_TOTAL: &str = "ws_rejections_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Chat messages persisted (counter, labels: message_type).
pub const MESSAGES_PERSISTED_TOTAL: &str = "messages_persisted_total";
/// Delivery attempts (counter, labels: result).
pub const DELIVERIES_TOTAL: &str = "deliveries_total";
/// Signaling payloads relayed (counter, labels: result).
pub const SIGNALS_RELAYED_TOTAL: &str = "signals_relayed_total";
/// Presence envelopes fanned out (counter, labels: status).
pub const PRESENCE_ANNOUNCEMENTS_TOTAL: &str = "presence_announcements_total";
/// Frames answered with an error envelope (counter, labels: kind).
pub const FRAME_ERRORS_TOTAL: &str = "frame_errors_total";
