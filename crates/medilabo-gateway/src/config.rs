//! Configuration loading

use anyhow::{Context, Result, bail};
use axum::http::Method;
use medilabo_api::rules::edge_rules;
use medilabo_auth::{PolicyError, Requirement, RoutePolicyEntry, RouteTable, default_exempt_prefixes};
use medilabo_db::Role;
use medilabo_proxy::BackendConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Ordered gateway policy; empty means the built-in table
    #[serde(default)]
    pub routes: Vec<RouteRuleConfig>,
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendEntry>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Signing secret; `JWT_SECRET` or `--jwt-secret` take precedence
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_access_denied_path")]
    pub access_denied_path: String,
    /// Path prefixes the cookie translator leaves alone
    #[serde(default = "default_exempt_prefixes")]
    pub exempt_prefixes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            login_path: default_login_path(),
            access_denied_path: default_access_denied_path(),
            exempt_prefixes: default_exempt_prefixes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Who may reach a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Authenticated,
    AnyOf,
}

/// One `[[routes]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRuleConfig {
    pub pattern: String,
    /// Empty means every method
    #[serde(default)]
    pub methods: Vec<String>,
    pub access: Access,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl RouteRuleConfig {
    fn to_entry(&self) -> Result<RoutePolicyEntry, PolicyError> {
        let methods = self
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_uppercase().as_bytes())
                    .map_err(|_| PolicyError::InvalidMethod(m.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let roles = self
            .roles
            .iter()
            .map(|r| r.parse::<Role>().map_err(|_| PolicyError::InvalidRole(r.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let requirement = match (self.access, roles.is_empty()) {
            (Access::AnyOf, false) => Requirement::AnyOf(roles.into_iter().collect()),
            (Access::AnyOf, true) => {
                return Err(PolicyError::InvalidRole(format!(
                    "route '{}' requires roles but lists none",
                    self.pattern
                )));
            }
            (_, false) => {
                return Err(PolicyError::InvalidRole(format!(
                    "route '{}' lists roles but access is not any_of",
                    self.pattern
                )));
            }
            (Access::Public, true) => Requirement::Public,
            (Access::Authenticated, true) => Requirement::Authenticated,
        };

        RoutePolicyEntry::new(&self.pattern, &methods, requirement)
    }
}

/// One `[[backends]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct BackendEntry {
    pub name: String,
    pub prefix: String,
    pub url: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "./data/medilabo.db".to_string()
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_access_denied_path() -> String {
    "/access-denied".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_backends() -> Vec<BackendEntry> {
    [
        ("patients", "/patients", "http://localhost:8081"),
        ("notes", "/notes", "http://localhost:8082"),
        ("risk", "/risk", "http://localhost:8083"),
        ("ui", "/", "http://localhost:8084"),
    ]
    .into_iter()
    .map(|(name, prefix, url)| BackendEntry {
        name: name.to_string(),
        prefix: prefix.to_string(),
        url: url.to_string(),
        timeout_secs: default_backend_timeout(),
    })
    .collect()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self {
                backends: default_backends(),
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Pick the signing secret, preferring the command line / environment
    pub fn resolve_secret(&self, override_secret: Option<String>) -> Result<String> {
        match override_secret.or_else(|| self.auth.jwt_secret.clone()) {
            Some(secret) if !secret.trim().is_empty() => Ok(secret),
            _ => bail!("No signing secret configured: set JWT_SECRET or [auth].jwt_secret"),
        }
    }

    /// Gateway policy table
    pub fn route_table(&self) -> Result<RouteTable> {
        if self.routes.is_empty() {
            return edge_rules(&self.auth.access_denied_path).context("Invalid built-in route table");
        }

        let entries = self
            .routes
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                rule.to_entry()
                    .with_context(|| format!("Invalid [[routes]] entry #{} ({})", i + 1, rule.pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        if !entries.iter().any(|e| e.pattern() == self.auth.login_path) {
            warn!(
                "No route entry names the login path {}; make sure a pattern covers it as public",
                self.auth.login_path
            );
        }

        Ok(RouteTable::new(entries))
    }

    pub fn backend_configs(&self) -> Vec<BackendConfig> {
        self.backends
            .iter()
            .map(|b| BackendConfig {
                name: b.name.clone(),
                prefix: b.prefix.clone(),
                url: b.url.clone(),
                timeout_secs: b.timeout_secs,
            })
            .collect()
    }
}
