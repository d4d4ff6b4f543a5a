//! `ChatServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chatline_core::{IdentityVerifier, MessageStore, UserId};
use chatline_store::{Database, MessageRepo, SqliteMessageStore};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{authorize, bearer_token};
use crate::config::ServerConfig;
use crate::error::{ApiError, ServerError};
use crate::health::{self, HealthResponse};
use crate::history;
use crate::ingest::IngestPipeline;
use crate::metrics::WS_REJECTIONS_TOTAL;
use crate::presence::PresenceBroadcaster;
use crate::registry::SessionRegistry;
use crate::router::DeliveryRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers and session tasks.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub presence: Arc<PresenceBroadcaster>,
    pub router: Arc<DeliveryRouter>,
    pub ingest: Arc<IngestPipeline>,
    /// Direct storage reads for history endpoints.
    pub history: MessageRepo,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Arc<ServerConfig>,
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Open WebSocket connections, superseded ones included until they exit.
    pub connections: Arc<AtomicUsize>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// The chat server.
pub struct ChatServer {
    state: AppState,
}

impl ChatServer {
    /// Server persisting to and reading history from `db`.
    pub fn new(config: ServerConfig, db: Database, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let store = Arc::new(SqliteMessageStore::new(db.clone()));
        Self::with_store(config, store, MessageRepo::new(db), verifier)
    }

    /// Server with a custom storage collaborator for live ingestion.
    pub fn with_store(
        config: ServerConfig,
        store: Arc<dyn MessageStore>,
        history: MessageRepo,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let presence = Arc::new(PresenceBroadcaster::new(registry.clone()));
        let router = Arc::new(DeliveryRouter::new(registry.clone(), presence.clone()));
        Self {
            state: AppState {
                registry,
                presence,
                router,
                ingest: Arc::new(IngestPipeline::new(store)),
                history,
                verifier,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                connections: Arc::new(AtomicUsize::new(0)),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws/{user_id}", get(ws_handler))
            .route("/messages", get(history::list_mine))
            .route("/messages/with/{peer_id}", get(history::list_with_peer))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve in a background task until shutdown is signalled.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr()?;

        let app = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server exited with error");
            }
        });
        info!(%local, "listening");
        Ok((local, handle))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// GET /ws/{user_id}?token=…: authenticate, then upgrade.
///
/// The token subject must equal `user_id`. A new user beyond
/// `max_connections` is refused with 503; a reconnect of an online user is
/// not. Concurrent upgrades can all pass this check, so admission enforces
/// the cap again under the registry lock and closes the losers with 1013.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<UserId>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    match admit_check(&state, user_id, query.token.as_deref().or(bearer_token(&headers))) {
        Ok(()) => ws
            .max_message_size(state.config.max_message_size)
            .on_upgrade(move |socket| run_ws_session(socket, user_id, state)),
        Err(e) => {
            counter!(WS_REJECTIONS_TOTAL, "reason" => e.code()).increment(1);
            warn!(%user_id, error = %e, "websocket upgrade refused");
            e.into_response()
        }
    }
}

fn admit_check(state: &AppState, user_id: UserId, credential: Option<&str>) -> Result<(), ApiError> {
    if state.shutdown.is_shutting_down() {
        return Err(ApiError::ShuttingDown);
    }
    let _ = authorize(state.verifier.as_ref(), credential, Some(user_id))?;
    if state.registry.len() >= state.config.max_connections && !state.registry.is_online(user_id) {
        return Err(ApiError::AtCapacity);
    }
    Ok(())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.load(Ordering::Relaxed),
        state.registry.len(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
