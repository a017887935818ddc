//! Authentication error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown subject or wrong password; the two are never told apart
    #[error("Invalid credentials")]
    AuthenticationFailure,

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Missing or invalid authorization header")]
    MissingCredential,

    #[error("Insufficient permissions")]
    Forbidden,

    /// Path with dot segments or backslashes, whose target depends on
    /// who resolves it
    #[error("Invalid request path")]
    InvalidPath,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Token encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Whether this error means "no usable identity" (as opposed to a
    /// known identity lacking a role, or a server-side fault)
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AuthError::AuthenticationFailure
                | AuthError::Malformed
                | AuthError::InvalidSignature
                | AuthError::Expired
                | AuthError::MissingCredential
        )
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::AuthenticationFailure => "authentication_failure",
            AuthError::Malformed => "malformed",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Expired => "expired",
            AuthError::MissingCredential => "missing_credential",
            AuthError::Forbidden => "forbidden",
            AuthError::InvalidPath => "invalid_path",
            AuthError::Configuration(_) => "configuration",
            AuthError::PasswordHash(_) => "password_hash",
            AuthError::Encoding(_) => "encoding",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::AuthenticationFailure => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            // Verification failures share one message so callers cannot learn the reason
            AuthError::Malformed | AuthError::InvalidSignature | AuthError::Expired => {
                (StatusCode::UNAUTHORIZED, "Invalid token")
            }
            AuthError::MissingCredential => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "Insufficient permissions"),
            AuthError::InvalidPath => (StatusCode::BAD_REQUEST, "Invalid request path"),
            AuthError::Configuration(_) | AuthError::PasswordHash(_) | AuthError::Encoding(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        let body = axum::Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::Expired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::MissingCredential.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::InvalidPath.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Configuration("short".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthenticated_classification() {
        assert!(AuthError::InvalidSignature.is_unauthenticated());
        assert!(AuthError::Malformed.is_unauthenticated());
        assert!(!AuthError::Forbidden.is_unauthenticated());
        assert!(!AuthError::InvalidPath.is_unauthenticated());
        assert!(!AuthError::Configuration(String::new()).is_unauthenticated());
    }
}
