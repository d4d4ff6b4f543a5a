//! Read-only history endpoints, served straight from storage.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use chatline_core::{Message, UserId};
use chatline_store::{MessageRepo, Page, StoreError};

use crate::auth::{authorize, bearer_token};
use crate::error::ApiError;
use crate::server::AppState;

/// GET /messages: every message the caller sent or received, newest first.
pub async fn list_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = authorize(state.verifier.as_ref(), bearer_token(&headers), None)?;
    let messages = run_blocking(state.history.clone(), move |repo| repo.list_for_user(user, page)).await?;
    Ok(Json(messages))
}

/// GET /messages/with/{peer_id}: the conversation with one peer, oldest first.
pub async fn list_with_peer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(peer): Path<UserId>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = authorize(state.verifier.as_ref(), bearer_token(&headers), None)?;
    let messages =
        run_blocking(state.history.clone(), move |repo| repo.list_between(user, peer, page)).await?;
    Ok(Json(messages))
}

async fn run_blocking<T, F>(repo: MessageRepo, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&MessageRepo) -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&repo))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}
