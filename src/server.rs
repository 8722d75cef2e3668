//! Wiring of the auth core into a running HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;

use crate::api::{AppState, create_router};
use crate::auth::{
    Argon2PasswordVerifier, CredentialStore, InMemoryCredentialStore, LoginService,
    PrincipalResolver, RequestAuthenticator, TokenCodec,
};
use crate::config::{AppConfig, ConfigError, TokenConfig};

/// The shared, read-only services behind the router.
#[derive(Clone)]
pub struct Services {
    pub codec: Arc<TokenCodec>,
    pub authenticator: Arc<RequestAuthenticator>,
    pub login: Arc<LoginService>,
}

impl Services {
    /// Build every service on top of `store`.
    ///
    /// Fails when the signing secret or lifetime is unusable, so a weak key
    /// aborts startup instead of weakening tokens.
    pub fn build(
        config: &TokenConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, ConfigError> {
        let codec = Arc::new(TokenCodec::from_config(config)?);
        Ok(Self::with_codec(codec, store))
    }

    pub fn with_codec(codec: Arc<TokenCodec>, store: Arc<dyn CredentialStore>) -> Self {
        let authenticator = Arc::new(RequestAuthenticator::new(
            codec.clone(),
            PrincipalResolver::new(store.clone()),
        ));
        let login = Arc::new(LoginService::new(
            store,
            Arc::new(Argon2PasswordVerifier::new()),
            codec.clone(),
        ));

        Self {
            codec,
            authenticator,
            login,
        }
    }

    pub fn router(&self) -> Router {
        create_router(
            AppState {
                login: self.login.clone(),
            },
            self.authenticator.clone(),
        )
    }
}

/// Serve the API on `config.bind` until the process is stopped.
pub async fn serve(config: AppConfig) -> Result<()> {
    let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
    let services = Services::build(&config.jwt, store)?;

    tracing::info!(
        lifetime_seconds = services.codec.lifetime().num_seconds(),
        "Token codec ready (HS256)"
    );

    let app = services.router();
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("Quote vault listening on http://{}", config.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
