//! Edge credential translation
//!
//! Moves the access token from the `ACCESS_TOKEN` cookie into the
//! canonical `Authorization: Bearer` header so every later step only has
//! to look in one place. No signature checks happen here.

use axum::http::{HeaderValue, Method, Request, header::AUTHORIZATION};
use tracing::debug;

use crate::cookie::{ACCESS_TOKEN_COOKIE, get_cookie};

pub const BEARER_PREFIX: &str = "Bearer ";

/// Paths that must stay reachable with a stale or missing credential
pub fn default_exempt_prefixes() -> Vec<String> {
    ["/auth/login", "/auth/register", "/health", "/healthz", "/metrics"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Whether `path` is `prefix` itself or lies below it
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Rewrites cookie credentials into the canonical header
#[derive(Debug, Clone)]
pub struct CredentialTranslator {
    exempt_prefixes: Vec<String>,
}

impl Default for CredentialTranslator {
    fn default() -> Self {
        Self::new(default_exempt_prefixes())
    }
}

impl CredentialTranslator {
    pub fn new(exempt_prefixes: Vec<String>) -> Self {
        Self { exempt_prefixes }
    }

    /// Bearer header value to add to `request`, if any
    pub fn credential_for<B>(&self, request: &Request<B>) -> Option<HeaderValue> {
        if request.headers().contains_key(AUTHORIZATION) {
            return None;
        }

        if request.method() == Method::OPTIONS {
            return None;
        }

        let token = get_cookie(request.headers(), ACCESS_TOKEN_COOKIE)?;
        if token.trim().is_empty() {
            return None;
        }

        let path = request.uri().path();
        if self.exempt_prefixes.iter().any(|p| under_prefix(path, p)) {
            return None;
        }

        match HeaderValue::from_str(&format!("{}{}", BEARER_PREFIX, token)) {
            Ok(value) => Some(value),
            Err(_) => {
                debug!("Ignoring access token cookie that is not a valid header value");
                None
            }
        }
    }

    /// Apply the translation in place
    pub fn apply<B>(&self, request: &mut Request<B>) {
        if let Some(value) = self.credential_for(request) {
            debug!("Translated access token cookie for {}", request.uri().path());
            request.headers_mut().insert(AUTHORIZATION, value);
        }
    }
}
