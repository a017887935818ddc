//! API routes

mod auth;
mod health;
pub mod metrics;
mod proxy;
mod types;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
};
use medilabo_auth::{enforce_edge_policy, reject_noncanonical_paths, translate_credentials};
use std::sync::Arc;
use tower::ServiceBuilder;

use crate::state::{AppState, MetricsHandle};

pub use auth::RequireAuth;
pub use types::{LoginRequest, LoginResponse, RegisterRequest, UserResponse};

/// Create the gateway router
///
/// Every route and the forwarding fallback sit behind the edge pipeline:
/// paths with dot segments are refused, then credentials are translated,
/// then the route policy applies. Methods the gateway's own routes do not
/// handle (`GET /auth/login` for the login page) are forwarded too. The
/// metrics endpoint is merged outside the pipeline.
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let edge = ServiceBuilder::new()
        .layer(from_fn(reject_noncanonical_paths))
        .layer(from_fn_with_state(state.translator.clone(), translate_credentials))
        .layer(from_fn_with_state(state.edge.clone(), enforce_edge_policy));

    let mut router = Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .fallback(proxy::forward)
        .method_not_allowed_fallback(proxy::forward)
        .with_state(state)
        .layer(edge);

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
}
