//! Token validation for resource services
//!
//! A resource service wraps its router with [`protect`] so that every
//! request is checked again against the service's own table, regardless
//! of what the gateway already decided.

use axum::{Router, middleware::from_fn_with_state};
use medilabo_auth::{RouteGuard, RouteTable, TokenCodec, enforce_service_policy};
use std::sync::Arc;

/// Guard `router` with `table`, answering 401 or 403 on refusal
pub fn protect<S>(router: Router<S>, codec: Arc<TokenCodec>, table: RouteTable) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let guard = Arc::new(RouteGuard::new(codec, table));
    router.layer(from_fn_with_state(guard, enforce_service_policy))
}
