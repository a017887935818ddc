//! MediLabo Authentication and Authorization
//!
//! Token issuing and verification, cookie-to-header credential
//! translation, and the route policy tables enforced both at the gateway
//! and inside each resource service.

pub mod cookie;
pub mod error;
pub mod issuer;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod token;
pub mod translator;

pub use cookie::{ACCESS_TOKEN_COOKIE, access_token_cookie, cleared_access_token_cookie, get_cookie};
pub use error::AuthError;
pub use issuer::{CredentialDirectory, DirectoryError, IssuedToken, StoredCredential, TokenIssuer};
pub use middleware::{
    AuthUser, EdgeGuard, RouteGuard, enforce_edge_policy, enforce_service_policy, reject_noncanonical_paths,
    translate_credentials,
};
pub use password::{hash_password, verify_password};
pub use policy::{
    Decision, PathPattern, PolicyError, Requirement, RoutePolicyEntry, RouteTable, bearer_token,
    is_canonical_path,
};
pub use token::{Claims, Identity, MIN_SECRET_BYTES, TOKEN_LIFETIME_SECS, TokenCodec};
pub use translator::{BEARER_PREFIX, CredentialTranslator, default_exempt_prefixes};
