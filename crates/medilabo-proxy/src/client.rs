//! Resource service client

use bytes::Bytes;
use http::{HeaderMap, HeaderName, Method, StatusCode, header};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ProxyError;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Backend configuration
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Name used in logs
    pub name: String,
    /// Path prefix routed to this backend (e.g. `/patients`)
    pub prefix: String,
    /// Base URL of the resource service
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Response relayed from a backend
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Client for one resource service
pub struct BackendClient {
    config: BackendConfig,
    base_url: Url,
    client: Client,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: BackendConfig) -> Result<Self, ProxyError> {
        if !config.prefix.starts_with('/') {
            return Err(ProxyError::InvalidConfig(format!(
                "backend '{}': prefix '{}' must start with '/'",
                config.name, config.prefix
            )));
        }

        let base_url = Url::parse(&config.url).map_err(|e| {
            ProxyError::InvalidConfig(format!("backend '{}': invalid url '{}': {}", config.name, config.url, e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidConfig(format!(
                "backend '{}': unsupported scheme '{}'",
                config.name,
                base_url.scheme()
            )));
        }

        // Redirects from a service belong to the browser, not to us
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        info!("Created backend client {} for {} -> {}", config.name, config.prefix, config.url);

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether `path` falls under this backend's prefix on a segment boundary
    pub fn serves(&self, path: &str) -> bool {
        let prefix = self.config.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path_and_query)
    }

    /// Forward a request and relay the response unchanged
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse, ProxyError> {
        let url = self.target_url(path_and_query);
        debug!("Forwarding {} {} to {}", method, path_and_query, self.name());

        let response = self
            .client
            .request(method, &url)
            .headers(strip_hop_by_hop(headers))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    warn!("Backend {} unreachable: {}", self.name(), e);
                    ProxyError::Unreachable(self.config.name.clone())
                } else {
                    ProxyError::Http(e)
                }
            })?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response.bytes().await?;

        Ok(ForwardedResponse { status, headers, body })
    }
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP.iter() {
        out.remove(name);
    }
    // Recomputed by the client from the actual body
    out.remove(header::CONTENT_LENGTH);
    out
}

/// Ordered set of backends; the first whose prefix matches wins
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<BackendClient>,
}

impl BackendRegistry {
    pub fn new(configs: Vec<BackendConfig>) -> Result<Self, ProxyError> {
        let backends = configs
            .into_iter()
            .map(BackendClient::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { backends })
    }

    pub fn resolve(&self, path: &str) -> Option<&BackendClient> {
        self.backends.iter().find(|b| b.serves(path))
    }

    /// Forward to whichever backend serves the request path
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse, ProxyError> {
        let path = path_and_query.split('?').next().unwrap_or(path_and_query);
        let backend = self
            .resolve(path)
            .ok_or_else(|| ProxyError::NoBackend(path.to_string()))?;
        backend.forward(method, path_and_query, headers, body).await
    }
}
