//! MediLabo Backend Proxy
//!
//! Forwards requests the gateway has allowed to the resource service
//! owning their path prefix. Credentials travel unchanged so each
//! service can verify them again.

pub mod client;
pub mod error;

pub use client::{BackendClient, BackendConfig, BackendRegistry, ForwardedResponse};
pub use error::ProxyError;
