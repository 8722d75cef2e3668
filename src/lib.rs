// Core modules
mod config;
mod model;
mod types;
pub mod api;
pub mod auth;
pub mod server;

// Re-export key types and functions
pub use config::{
    AppConfig, ConfigError, DEFAULT_BIND, DEFAULT_TOKEN_LIFETIME_SECONDS, MIN_SECRET_BYTES,
    TokenConfig, resolve_config_path,
};
pub use model::{Role, StoredCredentials, UserRecord};
pub use types::{Authority, HashedPassword, Username};

pub use auth::{
    Authentication, CredentialStore, InMemoryCredentialStore, Principal, PrincipalResolver,
    RequestAuthenticator, TokenCodec,
};
pub use server::Services;

use anyhow::Result;
use axum::Router;
use std::sync::Arc;

/// Convenience function to build the full router with an in-memory store.
///
/// Returns the router together with the store so callers can seed users.
pub fn create_app(config: &TokenConfig) -> Result<(Router, Arc<InMemoryCredentialStore>)> {
    let store = Arc::new(InMemoryCredentialStore::new());
    let services = Services::build(config, store.clone())?;
    Ok((services.router(), store))
}
