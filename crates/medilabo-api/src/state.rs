//! Application state

use medilabo_auth::{CredentialTranslator, EdgeGuard, TokenCodec, TokenIssuer};
use medilabo_db::Database;
use medilabo_proxy::BackendRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Handle used to render collected metrics
pub type MetricsHandle = PrometheusHandle;

/// Application state shared across handlers
///
/// Everything here is built once at startup and never mutated.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub issuer: Arc<TokenIssuer>,
    pub translator: Arc<CredentialTranslator>,
    pub edge: Arc<EdgeGuard>,
    pub backends: Arc<BackendRegistry>,
}

impl AppState {
    pub fn new(
        db: Database,
        codec: Arc<TokenCodec>,
        translator: CredentialTranslator,
        edge: EdgeGuard,
        backends: BackendRegistry,
    ) -> Self {
        let issuer = TokenIssuer::new(Arc::new(db.clone()), codec.clone());
        Self {
            db,
            codec,
            issuer: Arc::new(issuer),
            translator: Arc::new(translator),
            edge: Arc::new(edge),
            backends: Arc::new(backends),
        }
    }
}
