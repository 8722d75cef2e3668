//! Credential storage contract and an in-memory implementation.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Role, StoredCredentials, UserRecord};
use crate::types::Username;

/// Returned (inside the `anyhow::Error`) by [`CredentialStore::insert`] when
/// the username is already registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateUsername(pub Username);

impl fmt::Display for DuplicateUsername {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User `{}` already exists", self.0)
    }
}

impl std::error::Error for DuplicateUsername {}

/// Where users, their password hashes and their roles live.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up the stored hash and roles for `username`.
    async fn find_by_username(&self, username: &str) -> Result<Option<StoredCredentials>>;

    /// Whether `username` is already registered.
    async fn exists_by_username(&self, username: &str) -> Result<bool>;

    /// Register a new user. Fails with [`DuplicateUsername`] if the username
    /// is taken; the check and the write are atomic.
    async fn insert(&self, user: UserRecord) -> Result<()>;
}

/// Process-local credential store, keyed by username.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<Username, UserRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roles of an existing user.
    pub async fn set_roles(&self, username: &str, roles: Vec<Role>) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(username)
            .ok_or_else(|| anyhow::anyhow!("User `{}` does not exist", username))?;
        user.roles = roles;
        Ok(())
    }

    /// Remove a user. Returns whether it existed.
    pub async fn remove(&self, username: &str) -> bool {
        self.users.write().await.remove(username).is_some()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<StoredCredentials>> {
        let users = self.users.read().await;
        Ok(users.get(username).map(StoredCredentials::from))
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        Ok(self.users.read().await.contains_key(username))
    }

    async fn insert(&self, user: UserRecord) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(user.username.as_str()) {
            return Err(DuplicateUsername(user.username).into());
        }
        users.insert(user.username.clone(), user);
        Ok(())
    }
}
