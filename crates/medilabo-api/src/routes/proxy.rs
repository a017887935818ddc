//! Forwarding of allowed requests to resource services

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    response::Response,
};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Largest request body relayed to a service
const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Fallback handler: relay to the backend owning the path prefix
pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let body = to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Unreadable request body: {}", e)))?;

    let relayed = state
        .backends
        .forward(parts.method, &path_and_query, &parts.headers, body)
        .await?;

    debug!("Backend answered {} for {}", relayed.status, parts.uri.path());

    let mut response = Response::new(Body::from(relayed.body));
    *response.status_mut() = relayed.status;
    *response.headers_mut() = relayed.headers;
    Ok(response)
}
