//! Authentication middleware for Axum
//!
//! Layers, meant to be stacked in this order: [`reject_noncanonical_paths`],
//! [`translate_credentials`] then [`enforce_edge_policy`] at the gateway,
//! and [`enforce_service_policy`] in front of each resource service.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AuthError;
use crate::policy::{Decision, RouteTable, bearer_token, is_canonical_path};
use crate::token::{Identity, TokenCodec};
use crate::translator::CredentialTranslator;

/// Authenticated caller, inserted into request extensions once a guarded
/// route has verified the token
pub type AuthUser = Identity;

/// A route table paired with the codec that verifies its tokens
#[derive(Debug, Clone)]
pub struct RouteGuard {
    codec: Arc<TokenCodec>,
    table: RouteTable,
}

impl RouteGuard {
    pub fn new(codec: Arc<TokenCodec>, table: RouteTable) -> Self {
        Self { codec, table }
    }

    /// Evaluate a request against the table using its bearer header
    pub fn evaluate(&self, request: &Request) -> Result<Option<Identity>, AuthError> {
        self.table.evaluate(
            request.uri().path(),
            request.method(),
            bearer_token(request.headers()),
            &self.codec,
            Utc::now(),
        )
    }

    pub fn decide(&self, request: &Request) -> Decision {
        self.table.decide(
            request.uri().path(),
            request.method(),
            bearer_token(request.headers()),
            &self.codec,
            Utc::now(),
        )
    }
}

/// Gateway guard: browser-facing, so refusals become redirects
#[derive(Debug, Clone)]
pub struct EdgeGuard {
    guard: RouteGuard,
    login_path: String,
    access_denied_path: String,
}

impl EdgeGuard {
    pub fn new(guard: RouteGuard, login_path: impl Into<String>, access_denied_path: impl Into<String>) -> Self {
        Self {
            guard,
            login_path: login_path.into(),
            access_denied_path: access_denied_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

/// Refuse paths with dot segments with 400 before anything else looks at them
pub async fn reject_noncanonical_paths(request: Request, next: Next) -> Response {
    if !is_canonical_path(request.uri().path()) {
        info!("Rejected non-canonical path {} {}", request.method(), request.uri().path());
        metrics::counter!("medilabo_edge_decisions_total", "decision" => "invalid_path").increment(1);
        return AuthError::InvalidPath.into_response();
    }
    next.run(request).await
}

/// Copy the `ACCESS_TOKEN` cookie into the `Authorization` header
pub async fn translate_credentials(
    State(translator): State<Arc<CredentialTranslator>>,
    mut request: Request,
    next: Next,
) -> Response {
    translator.apply(&mut request);
    next.run(request).await
}

/// Apply the gateway route table
///
/// Unauthenticated requests are sent to the login page and callers
/// without a required role to the access-denied page, both with 303.
pub async fn enforce_edge_policy(
    State(edge): State<Arc<EdgeGuard>>,
    mut request: Request,
    next: Next,
) -> Response {
    let decision = edge.guard.decide(&request);
    metrics::counter!("medilabo_edge_decisions_total", "decision" => decision.label()).increment(1);

    match decision {
        Decision::Allow(identity) => {
            if let Some(user) = identity {
                debug!("Edge allowed {} for {}", request.uri().path(), user.subject);
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        Decision::RedirectToLogin => Redirect::to(&edge.login_path).into_response(),
        Decision::Deny => {
            info!("Edge denied {} {}", request.method(), request.uri().path());
            Redirect::to(&edge.access_denied_path).into_response()
        }
    }
}

/// Apply a resource service's own route table
///
/// Answers 401 for a missing or unusable token and 403 for a valid token
/// without a required role.
pub async fn enforce_service_policy(
    State(guard): State<Arc<RouteGuard>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = guard.evaluate(&request).inspect_err(|e| {
        let label = match e {
            AuthError::Forbidden => "deny",
            AuthError::InvalidPath => "invalid_path",
            _ => "unauthenticated",
        };
        metrics::counter!("medilabo_service_decisions_total", "decision" => label).increment(1);
    })?;
    metrics::counter!("medilabo_service_decisions_total", "decision" => "allow").increment(1);

    if let Some(user) = identity {
        request.extensions_mut().insert(user);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RoutePolicyEntry;
    use axum::{
        Router,
        body::Body,
        http::{self, Method, StatusCode, header},
        middleware::{from_fn, from_fn_with_state},
        routing::get,
    };
    use medilabo_db::Role;
    use tower::ServiceExt;

    const SECRET: &str = "middleware-test-secret-0123456789abcdef";

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(SECRET).unwrap())
    }

    fn table() -> RouteTable {
        RouteTable::new(vec![
            RoutePolicyEntry::public("/auth/**").unwrap(),
            RoutePolicyEntry::any_of("/patients/**", &[], &[Role::Organizer, Role::Practitioner]).unwrap(),
            RoutePolicyEntry::any_of("/notes/**", &[], &[Role::Practitioner]).unwrap(),
        ])
    }

    async fn whoami(request: Request) -> String {
        request
            .extensions()
            .get::<AuthUser>()
            .map(|u| u.subject.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn edge_app(codec: Arc<TokenCodec>) -> Router {
        let edge = Arc::new(EdgeGuard::new(
            RouteGuard::new(codec, table()),
            "/auth/login",
            "/access-denied",
        ));
        let translator = Arc::new(CredentialTranslator::default());

        // Later layers run first: translation must precede the policy
        Router::new()
            .route("/auth/login", get(whoami))
            .route("/patients/{id}", get(whoami))
            .route("/notes/{id}", get(whoami))
            .layer(from_fn_with_state(edge, enforce_edge_policy))
            .layer(from_fn_with_state(translator, translate_credentials))
            .layer(from_fn(reject_noncanonical_paths))
    }

    fn service_app(codec: Arc<TokenCodec>) -> Router {
        let guard = Arc::new(RouteGuard::new(codec, table()));
        Router::new()
            .route("/notes/{id}", get(whoami))
            .layer(from_fn_with_state(guard, enforce_service_policy))
    }

    fn get_with_cookie(path: &str, token: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(Method::GET).uri(path);
        if let Some(t) = token {
            builder = builder.header(header::COOKIE, format!("ACCESS_TOKEN={}", t));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_edge_cookie_is_translated_before_policy() {
        let codec = codec();
        let token = codec.issue("orga", &[Role::Organizer], Utc::now()).unwrap();

        let response = edge_app(codec)
            .oneshot(get_with_cookie("/patients/1", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "orga");
    }

    #[tokio::test]
    async fn test_edge_redirects() {
        let codec = codec();
        let token = codec.issue("orga", &[Role::Organizer], Utc::now()).unwrap();

        let response = edge_app(codec.clone())
            .oneshot(get_with_cookie("/patients/1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/auth/login");

        let response = edge_app(codec.clone())
            .oneshot(get_with_cookie("/notes/1", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/access-denied");

        let response = edge_app(codec)
            .oneshot(get_with_cookie("/auth/login", Some("stale")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_service_status_codes() {
        let codec = codec();
        let orga = codec.issue("orga", &[Role::Organizer], Utc::now()).unwrap();
        let prat = codec.issue("prat", &[Role::Practitioner], Utc::now()).unwrap();

        let request = |token: Option<&str>| {
            let mut builder = http::Request::builder().uri("/notes/1");
            if let Some(t) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
            }
            builder.body(Body::empty()).unwrap()
        };

        let response = service_app(codec.clone()).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = service_app(codec.clone()).oneshot(request(Some("x.y.z"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = service_app(codec.clone()).oneshot(request(Some(&orga))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = service_app(codec).oneshot(request(Some(&prat))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "prat");
    }

    #[tokio::test]
    async fn test_edge_rejects_dot_segments_before_policy() {
        let codec = codec();
        let token = codec.issue("orga", &[Role::Organizer], Utc::now()).unwrap();

        for path in ["/patients/../notes/1", "/patients/%2e%2e/notes/1", "/auth/../notes/1"] {
            let response = edge_app(codec.clone())
                .oneshot(get_with_cookie(path, Some(&token)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(body_string(response).await, r#"{"error":"Invalid request path"}"#);
        }
    }

    #[tokio::test]
    async fn test_service_rejects_dot_segments() {
        let codec = codec();
        let prat = codec.issue("prat", &[Role::Practitioner], Utc::now()).unwrap();

        let request = http::Request::builder()
            .uri("/notes/%2e%2e/notes/1")
            .header(header::AUTHORIZATION, format!("Bearer {}", prat))
            .body(Body::empty())
            .unwrap();
        let response = service_app(codec).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_service_ignores_cookie() {
        let codec = codec();
        let prat = codec.issue("prat", &[Role::Practitioner], Utc::now()).unwrap();

        let response = service_app(codec)
            .oneshot(get_with_cookie("/notes/1", Some(&prat)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
