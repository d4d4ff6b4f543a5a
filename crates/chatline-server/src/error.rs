//! Server startup errors and HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chatline_core::AuthError;
use chatline_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Failures while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors returned by HTTP handlers, rendered as
/// `{"error": <code>, "message": <text>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("server is at its connection limit")]
    AtCapacity,
    #[error("server is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("storage task failed: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AtCapacity | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::AtCapacity => "at_capacity",
            Self::ShuttingDown => "shutting_down",
            Self::Store(StoreError::NotFound(_)) => "not_found",
            Self::Store(_) | Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = json!({ "error": self.code(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::from(AuthError::MissingCredential).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::AtCapacity.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(StoreError::NotFound("message 9".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("join".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn response_body_shape() {
        let resp = ApiError::from(AuthError::InvalidToken("bad signature".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "unauthorized");
        assert_eq!(parsed["message"], "invalid token: bad signature");
    }

    #[test]
    fn bind_error_mentions_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
