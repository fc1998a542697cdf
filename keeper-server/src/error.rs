//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keeper_core::KeeperError;

/// Server error types mapped to HTTP status codes.
#[derive(Debug)]
pub enum ServerError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Database(String),
    Internal(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(e) => write!(f, "Bad request: {}", e),
            Self::Unauthorized(e) => write!(f, "Unauthorized: {}", e),
            Self::NotFound(e) => write!(f, "Not found: {}", e),
            Self::Conflict(e) => write!(f, "Conflict: {}", e),
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            Self::Unauthorized(e) => (StatusCode::UNAUTHORIZED, e.clone()),
            Self::NotFound(e) => (StatusCode::NOT_FOUND, e.clone()),
            Self::Conflict(e) => (StatusCode::CONFLICT, e.clone()),
            Self::Database(_) | Self::Internal(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<KeeperError> for ServerError {
    fn from(e: KeeperError) -> Self {
        match e {
            KeeperError::InvalidInput(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
