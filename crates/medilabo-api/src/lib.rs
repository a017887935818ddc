//! MediLabo Gateway API
//!
//! Axum routers for the gateway (login, logout, registration, health,
//! metrics and forwarding behind the edge pipeline) plus the policy
//! tables and guard used by the resource services.

pub mod error;
pub mod routes;
pub mod rules;
pub mod service;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
