//! Credential verification and token issuance

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medilabo_db::{Database, Role};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::password::verify_password;
use crate::token::{TOKEN_LIFETIME_SECS, TokenCodec};

/// Error raised by a credential directory backend
pub type DirectoryError = Box<dyn std::error::Error + Send + Sync>;

/// What the directory knows about a subject
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub password_hash: String,
    pub role: Role,
}

/// Lookup of stored credentials by subject name
#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    async fn find(&self, subject: &str) -> Result<Option<StoredCredential>, DirectoryError>;
}

#[async_trait]
impl CredentialDirectory for Database {
    async fn find(&self, subject: &str) -> Result<Option<StoredCredential>, DirectoryError> {
        let user = self.get_user_by_username(subject).await?;
        Ok(user.map(|u| StoredCredential {
            password_hash: u.password_hash,
            role: u.role,
        }))
    }
}

/// A freshly issued token and what it asserts
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub subject: String,
    pub role: Role,
    pub token: String,
    pub expires_in: i64,
}

/// Valid Argon2 hash that never matches; verified against when the subject
/// does not exist so both failure paths do the same work
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$dGltaW5nX2F0dGFja19wcmV2ZW50aW9u$K8rI5T7VdQ8xkO0GqK5K2w";

/// Checks credentials against the directory and issues tokens
#[derive(Clone)]
pub struct TokenIssuer {
    directory: Arc<dyn CredentialDirectory>,
    codec: Arc<TokenCodec>,
}

impl TokenIssuer {
    pub fn new(directory: Arc<dyn CredentialDirectory>, codec: Arc<TokenCodec>) -> Self {
        Self { directory, codec }
    }

    /// Authenticate a subject with a raw password
    pub async fn authenticate(&self, subject: &str, raw_password: &str) -> Result<IssuedToken, AuthError> {
        self.authenticate_at(subject, raw_password, Utc::now()).await
    }

    /// Authenticate against an explicit clock value
    pub async fn authenticate_at(
        &self,
        subject: &str,
        raw_password: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        debug!("Login attempt for subject: {}", subject);

        let stored = match self.directory.find(subject).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Credential lookup failed for {}: {}", subject, e);
                return Err(AuthError::AuthenticationFailure);
            }
        };

        let hash_to_verify = stored
            .as_ref()
            .map(|c| c.password_hash.as_str())
            .unwrap_or(DUMMY_HASH);

        let password_valid = match verify_password(raw_password, hash_to_verify) {
            Ok(valid) => valid,
            Err(e) => {
                warn!("Stored password hash for {} is unusable: {}", subject, e);
                false
            }
        };

        let credential = match (stored, password_valid) {
            (Some(c), true) => c,
            _ => {
                info!("Rejected login for subject {}", subject);
                return Err(AuthError::AuthenticationFailure);
            }
        };

        let token = self.codec.issue(subject, &[credential.role], now)?;

        info!("Subject {} logged in as {}", subject, credential.role);

        Ok(IssuedToken {
            subject: subject.to_string(),
            role: credential.role,
            token,
            expires_in: TOKEN_LIFETIME_SECS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use std::collections::HashMap;

    const SECRET: &str = "issuer-test-secret-key-0123456789abcdef";

    struct MemoryDirectory(HashMap<String, StoredCredential>);

    #[async_trait]
    impl CredentialDirectory for MemoryDirectory {
        async fn find(&self, subject: &str) -> Result<Option<StoredCredential>, DirectoryError> {
            Ok(self.0.get(subject).cloned())
        }
    }

    struct BrokenDirectory;

    #[async_trait]
    impl CredentialDirectory for BrokenDirectory {
        async fn find(&self, _subject: &str) -> Result<Option<StoredCredential>, DirectoryError> {
            Err("connection refused".into())
        }
    }

    fn issuer_with(directory: Arc<dyn CredentialDirectory>) -> (TokenIssuer, Arc<TokenCodec>) {
        let codec = Arc::new(TokenCodec::new(SECRET).unwrap());
        (TokenIssuer::new(directory, codec.clone()), codec)
    }

    fn memory_directory() -> Arc<dyn CredentialDirectory> {
        let mut users = HashMap::new();
        users.insert(
            "orga".to_string(),
            StoredCredential {
                password_hash: hash_password("orga-pass").unwrap(),
                role: Role::Organizer,
            },
        );
        users.insert(
            "broken".to_string(),
            StoredCredential {
                password_hash: "garbage".to_string(),
                role: Role::Practitioner,
            },
        );
        Arc::new(MemoryDirectory(users))
    }

    #[tokio::test]
    async fn test_successful_login_issues_token_with_directory_role() {
        let (issuer, codec) = issuer_with(memory_directory());

        let issued = issuer.authenticate("orga", "orga-pass").await.unwrap();
        assert_eq!(issued.role, Role::Organizer);
        assert_eq!(issued.expires_in, 3600);

        let identity = codec.verify(&issued.token, Utc::now()).unwrap();
        assert_eq!(identity.subject, "orga");
        assert!(identity.roles.contains(&Role::Organizer));
        assert_eq!(identity.roles.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_subject_and_wrong_password_are_indistinguishable() {
        let (issuer, _) = issuer_with(memory_directory());

        let wrong_password = issuer.authenticate("orga", "nope").await.unwrap_err();
        let unknown_subject = issuer.authenticate("ghost", "orga-pass").await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::AuthenticationFailure));
        assert!(matches!(unknown_subject, AuthError::AuthenticationFailure));
        assert_eq!(wrong_password.to_string(), unknown_subject.to_string());
    }

    #[test]
    fn test_dummy_hash_parses_and_never_matches() {
        // an unparseable dummy would skip the Argon2 work for unknown subjects
        for password in ["", "orga-pass", "anything"] {
            assert!(matches!(verify_password(password, DUMMY_HASH), Ok(false)));
        }
    }

    #[tokio::test]
    async fn test_directory_failure_is_authentication_failure() {
        let (issuer, _) = issuer_with(Arc::new(BrokenDirectory));
        let err = issuer.authenticate("orga", "orga-pass").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailure));
    }

    #[tokio::test]
    async fn test_corrupt_stored_hash_is_authentication_failure() {
        let (issuer, _) = issuer_with(memory_directory());
        let err = issuer.authenticate("broken", "garbage").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailure));
    }
}
