//! Signed access tokens (HS256 JWT)
//!
//! Issuing and verifying are pure functions of the shared secret and the
//! supplied clock value; nothing here touches the network or disk.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use medilabo_db::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::error::AuthError;

/// Lifetime of every issued token
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Minimum HS256 key length (256 bits)
pub const MIN_SECRET_BYTES: usize = 32;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Canonical role names
    pub roles: Vec<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Identity asserted by a verified token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub roles: BTreeSet<Role>,
}

impl Identity {
    pub fn has_any_role(&self, required: &BTreeSet<Role>) -> bool {
        !self.roles.is_disjoint(required)
    }
}

/// Issues and verifies tokens with one shared HMAC secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec, refusing secrets too short for HS256
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.trim().is_empty() {
            return Err(AuthError::Configuration(
                "signing secret is empty".to_string(),
            ));
        }
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AuthError::Configuration(format!(
                "signing secret must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                secret.len()
            )));
        }

        // Expiry is checked against the caller's clock in `verify`
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Issue a token for `subject` valid from `now` for one hour
    pub fn issue(&self, subject: &str, roles: &[Role], now: DateTime<Utc>) -> Result<String, AuthError> {
        let roles: BTreeSet<Role> = roles.iter().copied().collect();
        let exp = now + Duration::seconds(TOKEN_LIFETIME_SECS);

        let claims = Claims {
            sub: subject.to_string(),
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        debug!("Issuing token for subject: {}", subject);

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify a token at time `now`
    ///
    /// The signature is checked first; only a correctly signed token can be
    /// reported as expired.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        if token.split('.').count() != 3 {
            return Err(AuthError::Malformed);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(classify)?;
        let claims = data.claims;

        if now.timestamp() >= claims.exp {
            return Err(AuthError::Expired);
        }

        let roles = claims
            .roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|_| AuthError::Malformed)?;

        Ok(Identity {
            subject: claims.sub,
            roles,
        })
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Malformed,
    }
}
