//! Sign-up and sign-in: the only places tokens are issued.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::password::PasswordVerifier;
use crate::auth::store::{CredentialStore, DuplicateUsername};
use crate::auth::token::{TokenCodec, TokenError};
use crate::model::{Role, UserRecord};

pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 20;
pub const PASSWORD_MIN_CHARS: usize = 10;

/// Characters of which a password must contain at least one.
pub const PASSWORD_SPECIAL_CHARS: &[char] = &['_', '-', '*', '?', ':'];

/// Sign-up errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupError {
    /// Username or password fails the input rules
    Invalid(String),
    /// Username already registered
    UsernameTaken,
    /// Hashing or storage failed
    Internal(String),
}

impl fmt::Display for SignupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "{}", msg),
            Self::UsernameTaken => write!(f, "Username already taken"),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for SignupError {}

/// Sign-in errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// Username or password is blank
    Invalid(String),
    /// Unknown user or wrong password; deliberately not told apart
    BadCredentials,
    /// Store lookup failed
    Store(String),
    /// Token could not be issued
    Token(TokenError),
    /// Password check could not run
    Internal(String),
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "{}", msg),
            Self::BadCredentials => write!(f, "Bad credentials"),
            Self::Store(msg) => write!(f, "Credential store error: {}", msg),
            Self::Token(e) => write!(f, "{}", e),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for LoginError {}

/// Registers users and exchanges verified credentials for tokens.
pub struct LoginService {
    store: Arc<dyn CredentialStore>,
    verifier: Arc<dyn PasswordVerifier>,
    codec: Arc<TokenCodec>,
}

impl LoginService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn PasswordVerifier>,
        codec: Arc<TokenCodec>,
    ) -> Self {
        Self {
            store,
            verifier,
            codec,
        }
    }

    /// Register `username` with the default `USER` role.
    pub async fn sign_up(&self, username: &str, password: &str) -> Result<(), SignupError> {
        validate_username(username)?;
        validate_password(password)?;

        let taken = self
            .store
            .exists_by_username(username)
            .await
            .map_err(|e| SignupError::Internal(e.to_string()))?;
        if taken {
            return Err(SignupError::UsernameTaken);
        }

        // Argon2 is CPU-bound; keep it off the async workers.
        let verifier = self.verifier.clone();
        let plaintext = password.to_string();
        let hash = tokio::task::spawn_blocking(move || verifier.hash(&plaintext))
            .await
            .map_err(|e| SignupError::Internal(e.to_string()))?
            .map_err(|e| SignupError::Internal(e.to_string()))?;

        // A concurrent sign-up can win between the check above and this write.
        self.store
            .insert(UserRecord::new(username, hash, vec![Role::User]))
            .await
            .map_err(|e| match e.downcast_ref::<DuplicateUsername>() {
                Some(_) => SignupError::UsernameTaken,
                None => SignupError::Internal(e.to_string()),
            })?;

        info!(username = %username, "User registered");
        Ok(())
    }

    /// Verify `password` for `username` and issue a token.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<String, LoginError> {
        if username.trim().is_empty() {
            return Err(LoginError::Invalid("Username is required".to_string()));
        }
        if password.trim().is_empty() {
            return Err(LoginError::Invalid("Password is required".to_string()));
        }

        let credentials = self
            .store
            .find_by_username(username)
            .await
            .map_err(|e| LoginError::Store(e.to_string()))?;

        let Some(credentials) = credentials else {
            warn!(username = %username, "Sign-in failed");
            return Err(LoginError::BadCredentials);
        };

        let verifier = self.verifier.clone();
        let plaintext = password.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            verifier.matches(&plaintext, &credentials.password_hash)
        })
        .await
        .map_err(|e| LoginError::Internal(e.to_string()))?;

        if !matches {
            warn!(username = %username, "Sign-in failed");
            return Err(LoginError::BadCredentials);
        }

        let token = self.codec.sign(username).map_err(LoginError::Token)?;
        info!(username = %username, "Token issued");
        Ok(token)
    }
}

fn validate_username(username: &str) -> Result<(), SignupError> {
    let len = username.chars().count();
    if username.trim().is_empty() {
        return Err(SignupError::Invalid("Username is required".to_string()));
    }
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(SignupError::Invalid(format!(
            "Username should be between {} to {} characters",
            USERNAME_MIN_CHARS, USERNAME_MAX_CHARS
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), SignupError> {
    if password.trim().is_empty() {
        return Err(SignupError::Invalid("Password is required".to_string()));
    }
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(SignupError::Invalid(format!(
            "Password should contain at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_special = password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(&c));
    if !has_upper || !has_special {
        return Err(SignupError::Invalid(
            "Password must contain at least one uppercase letter and one special character (_, -, *, ?, :)"
                .to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::Argon2PasswordVerifier;
    use crate::auth::store::InMemoryCredentialStore;
    use crate::auth::token::SigningKey;
    use chrono::Duration;

    const PASSWORD: &str = "Sup3r-Secret";

    fn service() -> (LoginService, Arc<InMemoryCredentialStore>, Arc<TokenCodec>) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let codec = Arc::new(TokenCodec::new(
            SigningKey::new(b"login-service-test-secret-32byte").unwrap(),
            Duration::hours(24),
        ));
        let service = LoginService::new(
            store.clone(),
            Arc::new(Argon2PasswordVerifier::new()),
            codec.clone(),
        );
        (service, store, codec)
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let (service, store, codec) = service();
        service.sign_up("carol", PASSWORD).await.unwrap();

        let creds = store.find_by_username("carol").await.unwrap().unwrap();
        assert_eq!(creds.roles, vec![Role::User]);
        assert_ne!(creds.password_hash.as_str(), PASSWORD);

        let token = service.sign_in("carol", PASSWORD).await.unwrap();
        assert!(codec.is_valid(&token, "carol"));
    }

    #[tokio::test]
    async fn test_username_taken() {
        let (service, _, _) = service();
        service.sign_up("carol", PASSWORD).await.unwrap();
        assert_eq!(
            service.sign_up("carol", "Another-Pass1").await.unwrap_err(),
            SignupError::UsernameTaken
        );
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let (service, _, _) = service();
        service.sign_up("carol", PASSWORD).await.unwrap();

        let wrong_password = service.sign_in("carol", "Wrong-Password").await.unwrap_err();
        let unknown_user = service.sign_in("mallory", PASSWORD).await.unwrap_err();
        assert_eq!(wrong_password, LoginError::BadCredentials);
        assert_eq!(unknown_user, LoginError::BadCredentials);
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sign_up_same_username() {
        let (service, store, _) = service();
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.sign_up("carol", PASSWORD).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| *e == SignupError::UsernameTaken)
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_sign_in_is_invalid() {
        let (service, _, _) = service();
        service.sign_up("carol", PASSWORD).await.unwrap();

        assert!(matches!(
            service.sign_in("", PASSWORD).await,
            Err(LoginError::Invalid(_))
        ));
        assert!(matches!(
            service.sign_in("carol", "   ").await,
            Err(LoginError::Invalid(_))
        ));
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("a".repeat(20).as_str()).is_ok());
        assert!(matches!(validate_username(""), Err(SignupError::Invalid(_))));
        assert!(matches!(validate_username("ab"), Err(SignupError::Invalid(_))));
        assert!(matches!(
            validate_username("a".repeat(21).as_str()),
            Err(SignupError::Invalid(_))
        ));
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password(PASSWORD).is_ok());
        assert!(validate_password("ABCDEFGHI?").is_ok());
        assert!(matches!(validate_password(""), Err(SignupError::Invalid(_))));
        assert!(matches!(validate_password("Short-1"), Err(SignupError::Invalid(_))));
        // no uppercase
        assert!(matches!(validate_password("lowercase-only"), Err(SignupError::Invalid(_))));
        // no special character
        assert!(matches!(validate_password("NoSpecialChars1"), Err(SignupError::Invalid(_))));
        // '!' is not in the accepted set
        assert!(matches!(validate_password("Exclaim!Exclaim"), Err(SignupError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_invalid_sign_up_stores_nothing() {
        let (service, store, _) = service();
        assert!(service.sign_up("carol", "weak").await.is_err());
        assert!(store.is_empty().await);
    }
}
