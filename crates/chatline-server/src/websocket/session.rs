//! WebSocket session lifecycle: admission, frame loop, eviction.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use chatline_core::{ClassificationError, UserId};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::connection::ConnectionHandle;
use super::handler::{classification_error, handle_frame};
use super::heartbeat::run_idle_monitor;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL, WS_REJECTIONS_TOTAL, WS_SESSIONS_SUPERSEDED_TOTAL,
};
use crate::server::AppState;

/// How long the writer gets to flush its Close frame after the reader exits.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Run one authenticated connection for `user_id` until it closes.
///
/// 1. Admits the session, superseding any prior one for the user, or closes
///    with 1013 when a new user would exceed `max_connections`
/// 2. Announces "online" unless this is a reconnect over a live session
/// 3. Processes inbound frames in order; errors go back on this connection
/// 4. On exit evicts the session (if still current) and announces "offline"
#[instrument(skip_all, fields(user_id = %user_id, connection_id))]
pub async fn run_ws_session(mut ws: WebSocket, user_id: UserId, state: AppState) {
    let (handle, send_rx) = ConnectionHandle::channel(state.config.send_queue_capacity);
    let handle = Arc::new(handle);
    let _ = tracing::Span::current().record("connection_id", handle.id().as_str());

    // The pre-upgrade capacity check can race other upgrades; this one cannot.
    let Some(admission) = state
        .presence
        .admit(user_id, handle.clone(), state.config.max_connections)
    else {
        counter!(WS_REJECTIONS_TOTAL, "reason" => "at_capacity").increment(1);
        warn!("server at capacity, closing upgraded connection");
        let _ = ws
            .send(Message::Close(Some(CloseFrame {
                code: close_code::AGAIN,
                reason: "server at capacity".into(),
            })))
            .await;
        return;
    };
    let session = admission.session;
    if admission.superseded.is_some() {
        counter!(WS_SESSIONS_SUPERSEDED_TOTAL).increment(1);
    }

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    let _ = state.connections.fetch_add(1, Ordering::Relaxed);
    let (ws_tx, mut ws_rx) = ws.split();
    info!("client connected");

    let mut outbound = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        handle.clone(),
        state.config.ping_interval,
    ));
    let idle_monitor = state
        .config
        .idle_timeout
        .map(|timeout| tokio::spawn(run_idle_monitor(handle.clone(), timeout, state.shutdown.token())));

    let closed = handle.closed_token();
    let shutdown = state.shutdown.token();
    loop {
        let next = tokio::select! {
            () = closed.cancelled() => break,
            () = shutdown.cancelled() => break,
            next = ws_rx.next() => next,
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        };
        handle.mark_activity();

        let text = match msg {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Binary(data) => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    text.to_owned()
                } else {
                    let error = ClassificationError::MalformedFrame("binary frame is not UTF-8".into());
                    let _ = handle.send(&classification_error(&error));
                    continue;
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if let Some(error) = handle_frame(&text, user_id, &state.ingest, &state.router).await {
            if !handle.send(&error) {
                debug!("failed to enqueue error envelope");
            }
        }
    }

    let evicted = state.presence.evict(&session);
    handle.close();
    if tokio::time::timeout(WRITER_DRAIN, &mut outbound).await.is_err() {
        outbound.abort();
    }
    if let Some(monitor) = idle_monitor {
        monitor.abort();
    }

    let _ = state.connections.fetch_sub(1, Ordering::Relaxed);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(handle.age().as_secs_f64());
    info!(
        evicted,
        connected_at = %session.connected_at(),
        dropped = handle.drop_count(),
        "client disconnected"
    );
}

/// Sole writer for the socket: drains the send queue and emits Pings.
/// Any write failure closes the handle, which ends the reader loop.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<String>,
    handle: Arc<ConnectionHandle>,
    ping_every: Duration,
) {
    let closed = handle.closed_token();
    let mut ping = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = closed.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            msg = send_rx.recv() => {
                let Some(text) = msg else { break };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    debug!("websocket write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    debug!("ping write failed");
                    break;
                }
            }
        }
    }
    handle.close();
}
