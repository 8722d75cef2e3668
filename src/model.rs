use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{HashedPassword, Username};

/// Roles a user can hold.
///
/// The auth core never branches on a specific role; it only turns the
/// role's name into an authority string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Basic access to user-level features.
    User,
    /// Management-level access, including moderation.
    Admin,
    /// Limited admin access, mostly content review.
    Moderator,
    /// Full system access.
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Moderator => "MODERATOR",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user as held by a credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: Username,
    pub password_hash: HashedPassword,
    pub roles: Vec<Role>,
}

impl UserRecord {
    pub fn new(
        username: impl Into<Username>,
        password_hash: HashedPassword,
        roles: Vec<Role>,
    ) -> Self {
        Self {
            username: username.into(),
            password_hash,
            roles,
        }
    }
}

/// What a credential store hands back for a username lookup.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub password_hash: HashedPassword,
    pub roles: Vec<Role>,
}

impl From<&UserRecord> for StoredCredentials {
    fn from(user: &UserRecord) -> Self {
        Self {
            password_hash: user.password_hash.clone(),
            roles: user.roles.clone(),
        }
    }
}
