//! Principal resolution: username → identity plus authorities.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::store::CredentialStore;
use crate::types::{Authority, Username};

/// Prefix applied to every role name to form its authority.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Anything authorization can ask about granted authorities.
pub trait HasAuthorities {
    fn authorities(&self) -> &[Authority];

    fn has_authority(&self, authority: &str) -> bool {
        self.authorities().iter().any(|a| a.as_str() == authority)
    }

    /// Check for `ROLE_<role>`.
    fn has_role(&self, role: &str) -> bool {
        self.authorities()
            .iter()
            .any(|a| a.as_str().strip_prefix(ROLE_PREFIX) == Some(role))
    }
}

/// The authenticated identity for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    username: Username,
    authorities: Vec<Authority>,
}

impl Principal {
    pub fn new(username: impl Into<Username>, authorities: Vec<Authority>) -> Self {
        Self {
            username: username.into(),
            authorities,
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }
}

impl HasAuthorities for Principal {
    fn authorities(&self) -> &[Authority] {
        &self.authorities
    }
}

/// Principal resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The credential store has no such user
    PrincipalNotFound,
    /// The credential store itself failed
    Store(String),
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrincipalNotFound => "principal_not_found",
            Self::Store(_) => "store_error",
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrincipalNotFound => write!(f, "User not found"),
            Self::Store(msg) => write!(f, "Credential store error: {}", msg),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Loads principals from the credential store. Never caches.
#[derive(Clone)]
pub struct PrincipalResolver {
    store: Arc<dyn CredentialStore>,
}

impl PrincipalResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Build the principal for `username` from a fresh store lookup.
    ///
    /// No password check happens here; callers have already proven
    /// possession of a validly signed token.
    pub async fn load_principal(&self, username: &str) -> Result<Principal, ResolveError> {
        let credentials = self
            .store
            .find_by_username(username)
            .await
            .map_err(|e| ResolveError::Store(e.to_string()))?
            .ok_or(ResolveError::PrincipalNotFound)?;

        let authorities = credentials
            .roles
            .iter()
            .map(|role| Authority::new(format!("{}{}", ROLE_PREFIX, role)))
            .collect();

        Ok(Principal::new(username, authorities))
    }
}
