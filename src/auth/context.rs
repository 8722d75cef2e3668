//! Request-scoped authentication.
//!
//! The authenticator stores an `Authentication` in the request's extensions
//! once a token checks out. Handlers read it back through the extractor
//! below; its absence is what makes authorization reject the request.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::auth::principal::{HasAuthorities, Principal};
use crate::types::{Authority, Username};

/// An authenticated principal plus metadata about the request it came with.
///
/// Immutable once installed; lives exactly as long as the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authentication {
    principal: Principal,
    /// Client IP address (for audit logging)
    ip_address: Option<String>,
    /// Client user agent (for audit logging)
    user_agent: Option<String>,
}

impl Authentication {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Set client metadata for audit logging.
    pub fn with_client_info(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn username(&self) -> &Username {
        self.principal.username()
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Fail with 403 unless the principal holds `authority`.
    pub fn require_authority(&self, authority: &str) -> Result<(), StatusCode> {
        if self.has_authority(authority) {
            Ok(())
        } else {
            Err(StatusCode::FORBIDDEN)
        }
    }
}

impl HasAuthorities for Authentication {
    fn authorities(&self) -> &[Authority] {
        self.principal.authorities()
    }
}

/// Handlers that take an `Authentication` only run for authenticated requests.
impl<S> FromRequestParts<S> for Authentication
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authentication>()
            .cloned()
            .ok_or(StatusCode::FORBIDDEN)
    }
}
