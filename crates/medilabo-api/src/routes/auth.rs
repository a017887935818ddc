//! Authentication extractors and routes

use axum::{
    Json, Router,
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, header::SET_COOKIE, request::Parts},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use chrono::Utc;
use medilabo_auth::{
    AuthError, AuthUser, access_token_cookie, bearer_token, cleared_access_token_cookie, hash_password,
};
use medilabo_db::{NewUser, Role};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

use super::types::{LoginRequest, LoginResponse, RegisterRequest, UserResponse};

// ==================== Auth Extractors ====================

/// Extractor for an authenticated caller (required)
///
/// Reuses the identity attached by a policy layer when there is one and
/// otherwise verifies the bearer header itself.
pub struct RequireAuth(pub AuthUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(RequireAuth(user.clone()));
        }

        let app_state = AppState::from_ref(state);
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingCredential)?;
        let user = app_state.codec.verify(token, Utc::now())?;

        debug!("Authenticated subject: {}", user.subject);
        Ok(RequireAuth(user))
    }
}

// ==================== Input Validation ====================

/// Maximum allowed username length
const MAX_USERNAME_LENGTH: usize = 64;
/// Maximum allowed password length (prevent DoS with very large passwords)
const MAX_PASSWORD_LENGTH: usize = 256;

/// Validate username format and length
fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::BadRequest("Username cannot be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Username exceeds maximum length of {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(ApiError::BadRequest(
            "Username can only contain alphanumeric characters, underscores, and hyphens".to_string(),
        ));
    }
    Ok(())
}

/// Validate password length
fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::BadRequest("Password cannot be empty".to_string()));
    }
    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password exceeds maximum length of {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

// ==================== Auth Routes ====================

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_username(&request.username)?;
    validate_password(&request.password)?;

    let issued = match state.issuer.authenticate(&request.username, &request.password).await {
        Ok(issued) => issued,
        Err(e) => {
            metrics::counter!("medilabo_logins_total", "outcome" => "failure").increment(1);
            return Err(e.into());
        }
    };
    metrics::counter!("medilabo_logins_total", "outcome" => "success").increment(1);

    Ok((
        [(SET_COOKIE, access_token_cookie(&issued.token))],
        Json(LoginResponse {
            token: issued.token,
            expires_in: issued.expires_in,
        }),
    ))
}

/// POST /auth/logout
async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let target = format!("{}?logout", state.edge.login_path());
    ([(SET_COOKIE, cleared_access_token_cookie())], Redirect::to(&target))
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_username(&request.username)?;
    validate_password(&request.password)?;

    let role: Role = request
        .role
        .parse()
        .map_err(|e: medilabo_db::ParseError| ApiError::BadRequest(e.to_string()))?;

    // a taken username surfaces as DbError::Duplicate (409)
    let password_hash = hash_password(&request.password)?;
    let user = state
        .db
        .insert_user(NewUser {
            username: request.username,
            password_hash,
            role,
        })
        .await?;

    info!("Registered user {} as {}", user.username, user.role);

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /auth/me
async fn me(RequireAuth(user): RequireAuth) -> Json<AuthUser> {
    Json(user)
}

/// Create auth routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("orga").is_ok());
        assert!(validate_username("dr_house-2").is_ok());
        assert!(validate_username(&"a".repeat(64)).is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("x;drop").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password(&"p".repeat(256)).is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"p".repeat(257)).is_err());
    }
}
