//! MediLabo Gateway - token-authenticating edge for the MediLabo services

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;
use medilabo_api::{AppState, create_router};
use medilabo_auth::{CredentialTranslator, EdgeGuard, RouteGuard, TokenCodec};
use medilabo_db::Database;
use medilabo_proxy::BackendRegistry;

/// MediLabo Gateway - authentication and role-based routing for MediLabo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "MEDILABO_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "MEDILABO_PORT")]
    port: Option<u16>,

    /// Token signing secret (at least 32 bytes)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    init_logging(&config.logging.level, &config.logging.format);

    info!("Starting MediLabo Gateway v{}", env!("CARGO_PKG_VERSION"));

    // A missing or weak secret stops startup here
    let secret = config.resolve_secret(args.jwt_secret)?;
    let codec = Arc::new(TokenCodec::new(&secret).context("Invalid signing secret")?);

    let table = config.route_table()?;
    info!("Loaded {} gateway route policy entries", table.entries().len());

    if let Some(parent) = std::path::Path::new(&config.database.path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let db_path = format!("sqlite:{}?mode=rwc", config.database.path);
    let db = Database::new(&db_path).await?;

    if !db.has_users().await? {
        warn!("No users registered yet; create one with POST /auth/register");
    }

    let backends = BackendRegistry::new(config.backend_configs())?;
    for backend in &config.backends {
        info!("Backend {}: {} -> {}", backend.name, backend.prefix, backend.url);
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let edge = EdgeGuard::new(
        RouteGuard::new(codec.clone(), table),
        config.auth.login_path.clone(),
        config.auth.access_denied_path.clone(),
    );
    let translator = CredentialTranslator::new(config.auth.exempt_prefixes.clone());

    let state = AppState::new(db, codec, translator, edge, backends);

    let app = create_router(state, Some(Arc::new(metrics_handle))).layer(TraceLayer::new_for_http());

    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
