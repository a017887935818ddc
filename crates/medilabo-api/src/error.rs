//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use medilabo_auth::AuthError;
use medilabo_db::DbError;
use medilabo_proxy::ProxyError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Database(DbError::Duplicate(msg)) => (StatusCode::CONFLICT, msg),
            ApiError::Database(e) => {
                error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
            // Auth errors carry their own status and deliberately vague messages
            ApiError::Auth(e) => return e.into_response(),
            ApiError::Proxy(ProxyError::NoBackend(path)) => {
                (StatusCode::NOT_FOUND, format!("No service for {}", path))
            }
            ApiError::Proxy(e @ ProxyError::InvalidConfig(_)) => {
                error!("Proxy misconfigured: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
            ApiError::Proxy(e) => {
                error!("Forwarding failed: {}", e);
                (StatusCode::BAD_GATEWAY, "Service unavailable".to_string())
            }
        };

        let body = axum::Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
