//! Built-in route policy tables
//!
//! The gateway table is coarse and path based. Each resource service
//! carries a finer table keyed on method as well, so a request the
//! gateway lets through can still be refused by the service.

use axum::http::Method;
use medilabo_auth::{PolicyError, RoutePolicyEntry, RouteTable};
use medilabo_db::Role;

const ANY_ROLE: &[Role] = &[Role::Organizer, Role::Practitioner];
const WRITES: &[Method] = &[Method::POST, Method::PUT, Method::DELETE];

/// Paths the gateway serves without a credential
pub fn edge_public_paths(access_denied_path: &str) -> Vec<String> {
    let mut paths: Vec<String> = [
        "/auth/**",
        "/health",
        "/healthz",
        "/metrics",
        "/favicon.ico",
        "/css/**",
        "/js/**",
        "/images/**",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    paths.insert(1, access_denied_path.to_string());
    paths
}

/// Gateway table used when the configuration does not define one
pub fn edge_rules(access_denied_path: &str) -> Result<RouteTable, PolicyError> {
    let mut entries = edge_public_paths(access_denied_path)
        .iter()
        .map(|p| RoutePolicyEntry::public(p))
        .collect::<Result<Vec<_>, _>>()?;

    entries.extend([
        RoutePolicyEntry::any_of("/ui/**", &[], ANY_ROLE)?,
        RoutePolicyEntry::any_of("/patients/**", &[], ANY_ROLE)?,
        RoutePolicyEntry::any_of("/notes/**", &[], &[Role::Practitioner])?,
        RoutePolicyEntry::any_of("/risk/**", &[], &[Role::Practitioner])?,
        RoutePolicyEntry::authenticated("/**")?,
    ]);

    Ok(RouteTable::new(entries))
}

fn service_table(mut entries: Vec<RoutePolicyEntry>) -> Result<RouteTable, PolicyError> {
    entries.insert(0, RoutePolicyEntry::public("/health")?);
    entries.push(RoutePolicyEntry::authenticated("/**")?);
    Ok(RouteTable::new(entries))
}

/// Patient service: anyone may read, only organizers may change records
pub fn patient_service_rules() -> Result<RouteTable, PolicyError> {
    service_table(vec![
        RoutePolicyEntry::any_of("/patients/**", &[Method::GET], ANY_ROLE)?,
        RoutePolicyEntry::any_of("/patients/**", WRITES, &[Role::Organizer])?,
    ])
}

/// Note service: anyone may read, only practitioners may write notes
pub fn note_service_rules() -> Result<RouteTable, PolicyError> {
    service_table(vec![
        RoutePolicyEntry::any_of("/notes/**", &[Method::GET], ANY_ROLE)?,
        RoutePolicyEntry::any_of("/notes/**", WRITES, &[Role::Practitioner])?,
    ])
}

/// Risk service: assessments are for practitioners only
pub fn risk_service_rules() -> Result<RouteTable, PolicyError> {
    service_table(vec![RoutePolicyEntry::any_of(
        "/risk/**",
        &[Method::GET],
        &[Role::Practitioner],
    )?])
}
