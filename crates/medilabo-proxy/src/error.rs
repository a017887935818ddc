//! Proxy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid backend configuration: {0}")]
    InvalidConfig(String),

    #[error("No backend serves path: {0}")]
    NoBackend(String),

    #[error("Backend {0} is unreachable")]
    Unreachable(String),
}
