//! Per-request bearer token authentication.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderMap;
use http::header::{AUTHORIZATION, USER_AGENT};
use tracing::{debug, error};

use crate::auth::context::Authentication;
use crate::auth::principal::{PrincipalResolver, ResolveError};
use crate::auth::token::{TokenCodec, TokenError};
use crate::types::Username;

/// Exact prefix of an `Authorization` value carrying a token.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Why a presented token did not authenticate. Never shown to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    Token(TokenError),
    Principal(ResolveError),
    /// Token verifies but names someone other than the loaded principal
    SubjectMismatch,
}

impl AuthFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token(e) => e.kind(),
            Self::Principal(e) => e.kind(),
            Self::SubjectMismatch => "subject_mismatch",
        }
    }
}

/// Terminal state of one authentication pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No `Authorization: Bearer` header
    NoToken,
    /// A token was presented but did not authenticate
    Rejected(AuthFailure),
    /// The request already carried an authentication
    AlreadyAuthenticated,
    /// A principal was installed for this username
    Authenticated(Username),
}

/// Validates bearer tokens and installs the resulting principal.
pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    resolver: PrincipalResolver,
}

impl RequestAuthenticator {
    pub fn new(codec: Arc<TokenCodec>, resolver: PrincipalResolver) -> Self {
        Self { codec, resolver }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Run one authentication pass over `request`.
    ///
    /// On success an `Authentication` is inserted into the request's
    /// extensions. Every other outcome leaves the request untouched.
    pub async fn authenticate<B>(&self, request: &mut http::Request<B>) -> AuthOutcome {
        let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
            return AuthOutcome::NoToken;
        };

        let subject = match self.codec.extract_subject(&token) {
            Ok(subject) => subject,
            Err(e) => {
                debug!(reason = e.kind(), "Bearer token rejected");
                return AuthOutcome::Rejected(AuthFailure::Token(e));
            }
        };

        if request.extensions().get::<Authentication>().is_some() {
            return AuthOutcome::AlreadyAuthenticated;
        }

        let principal = match self.resolver.load_principal(&subject).await {
            Ok(principal) => principal,
            Err(e) => {
                match &e {
                    ResolveError::Store(msg) => {
                        error!(username = %subject, "Principal lookup failed: {}", msg)
                    }
                    ResolveError::PrincipalNotFound => {
                        debug!(username = %subject, "Bearer token names an unknown user")
                    }
                }
                return AuthOutcome::Rejected(AuthFailure::Principal(e));
            }
        };

        if !self.codec.is_valid(&token, principal.username().as_str()) {
            let failure = match self.codec.verify(&token) {
                Err(e) => AuthFailure::Token(e),
                Ok(_) => AuthFailure::SubjectMismatch,
            };
            debug!(username = %subject, reason = failure.kind(), "Bearer token rejected");
            return AuthOutcome::Rejected(failure);
        }

        let (ip_address, user_agent) = client_info(request);
        let username = principal.username().clone();
        debug!(username = %username, "Bearer token authenticated");

        request
            .extensions_mut()
            .insert(Authentication::new(principal).with_client_info(ip_address, user_agent));

        AuthOutcome::Authenticated(username)
    }
}

/// axum middleware: authenticate, then always hand the request on.
pub async fn authenticate_request(
    State(authenticator): State<Arc<RequestAuthenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    authenticator.authenticate(&mut request).await;
    next.run(request).await
}

/// The token part of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
}

fn client_info<B>(request: &http::Request<B>) -> (Option<String>, Option<String>) {
    let headers = request.headers();
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .or_else(|| {
            headers
                .get("X-Forwarded-For")
                .or_else(|| headers.get("X-Real-IP"))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|s| s.trim().to_string())
        });
    let ua = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    (ip, ua)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::principal::HasAuthorities;
    use crate::auth::store::{CredentialStore, InMemoryCredentialStore};
    use crate::auth::token::SigningKey;
    use crate::model::{Role, UserRecord};
    use crate::types::HashedPassword;
    use chrono::{DateTime, Duration};

    const SECRET: &[u8] = b"authenticator-test-secret-32byte";

    struct Fixture {
        authenticator: RequestAuthenticator,
        codec: Arc<TokenCodec>,
        store: Arc<InMemoryCredentialStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_753_400_000, 0).unwrap(),
        ));
        let codec = Arc::new(
            TokenCodec::new(SigningKey::new(SECRET).unwrap(), Duration::hours(24))
                .with_clock(clock.clone()),
        );
        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .insert(UserRecord::new(
                "carol",
                HashedPassword::new("hash"),
                vec![Role::User],
            ))
            .await
            .unwrap();

        let authenticator =
            RequestAuthenticator::new(codec.clone(), PrincipalResolver::new(store.clone()));
        Fixture {
            authenticator,
            codec,
            store,
            clock,
        }
    }

    fn request_with(authorization: Option<&str>) -> http::Request<()> {
        let mut builder = http::Request::builder().uri("/me");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        for value in ["bearer abc", "Bearer", "BearerAbc", "Basic dXNlcjpwYXNz", "Token abc"] {
            headers.insert(AUTHORIZATION, value.parse().unwrap());
            assert_eq!(bearer_token(&headers), None, "header {:?}", value);
        }
    }

    #[tokio::test]
    async fn test_valid_token_installs_principal() {
        let fx = fixture().await;
        let token = fx.codec.sign("carol").unwrap();
        let mut request = request_with(Some(&format!("Bearer {}", token)));
        request
            .headers_mut()
            .insert(USER_AGENT, "test-agent/1.0".parse().unwrap());
        request
            .headers_mut()
            .insert("X-Forwarded-For", "203.0.113.7, 10.0.0.1".parse().unwrap());

        let outcome = fx.authenticator.authenticate(&mut request).await;
        assert_eq!(outcome, AuthOutcome::Authenticated(Username::new("carol")));

        let auth = request.extensions().get::<Authentication>().unwrap();
        assert_eq!(auth.username().as_str(), "carol");
        let authorities: Vec<&str> = auth.authorities().iter().map(|a| a.as_str()).collect();
        assert_eq!(authorities, vec!["ROLE_USER"]);
        assert_eq!(auth.user_agent(), Some("test-agent/1.0"));
        assert_eq!(auth.ip_address(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_connect_info_address_is_recorded() {
        let fx = fixture().await;
        let token = fx.codec.sign("carol").unwrap();
        let mut request = request_with(Some(&format!("Bearer {}", token)));
        let addr: SocketAddr = "198.51.100.20:54321".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        fx.authenticator.authenticate(&mut request).await;
        let auth = request.extensions().get::<Authentication>().unwrap();
        assert_eq!(auth.ip_address(), Some("198.51.100.20"));
    }

    #[tokio::test]
    async fn test_missing_or_foreign_header() {
        let fx = fixture().await;

        let mut request = request_with(None);
        assert_eq!(fx.authenticator.authenticate(&mut request).await, AuthOutcome::NoToken);
        assert!(request.extensions().get::<Authentication>().is_none());

        let mut request = request_with(Some("Basic Y2Fyb2w6cGFzcw=="));
        assert_eq!(fx.authenticator.authenticate(&mut request).await, AuthOutcome::NoToken);
        assert!(request.extensions().get::<Authentication>().is_none());
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let fx = fixture().await;
        let mut request = request_with(Some("Bearer garbage"));

        let outcome = fx.authenticator.authenticate(&mut request).await;
        assert_eq!(
            outcome,
            AuthOutcome::Rejected(AuthFailure::Token(TokenError::Malformed))
        );
        assert!(request.extensions().get::<Authentication>().is_none());
    }

    #[tokio::test]
    async fn test_token_from_another_key() {
        let fx = fixture().await;
        let foreign = TokenCodec::new(
            SigningKey::new(b"some-other-secret-that-is-32-byt").unwrap(),
            Duration::hours(24),
        );
        let token = foreign.sign("carol").unwrap();
        let mut request = request_with(Some(&format!("Bearer {}", token)));

        let outcome = fx.authenticator.authenticate(&mut request).await;
        assert_eq!(
            outcome,
            AuthOutcome::Rejected(AuthFailure::Token(TokenError::InvalidSignature))
        );
        assert!(request.extensions().get::<Authentication>().is_none());
    }

    #[tokio::test]
    async fn test_expired_token() {
        let fx = fixture().await;
        let token = fx.codec.sign("carol").unwrap();
        fx.clock.advance(Duration::hours(24) + Duration::seconds(1));

        let mut request = request_with(Some(&format!("Bearer {}", token)));
        let outcome = fx.authenticator.authenticate(&mut request).await;
        assert_eq!(
            outcome,
            AuthOutcome::Rejected(AuthFailure::Token(TokenError::Expired))
        );
        assert!(request.extensions().get::<Authentication>().is_none());
    }

    #[tokio::test]
    async fn test_deleted_user() {
        let fx = fixture().await;
        let token = fx.codec.sign("carol").unwrap();
        fx.store.remove("carol").await;

        let mut request = request_with(Some(&format!("Bearer {}", token)));
        let outcome = fx.authenticator.authenticate(&mut request).await;
        assert_eq!(
            outcome,
            AuthOutcome::Rejected(AuthFailure::Principal(ResolveError::PrincipalNotFound))
        );
        assert!(request.extensions().get::<Authentication>().is_none());
    }

    #[tokio::test]
    async fn test_existing_authentication_is_kept() {
        let fx = fixture().await;
        let token = fx.codec.sign("carol").unwrap();
        let mut request = request_with(Some(&format!("Bearer {}", token)));
        let earlier = Authentication::new(crate::auth::Principal::new("someone-else", vec![]));
        request.extensions_mut().insert(earlier);

        let outcome = fx.authenticator.authenticate(&mut request).await;
        assert_eq!(outcome, AuthOutcome::AlreadyAuthenticated);
        let auth = request.extensions().get::<Authentication>().unwrap();
        assert_eq!(auth.username().as_str(), "someone-else");
    }

    #[tokio::test]
    async fn test_role_change_applies_to_next_request() {
        let fx = fixture().await;
        let token = fx.codec.sign("carol").unwrap();
        let header = format!("Bearer {}", token);

        let mut first = request_with(Some(&header));
        fx.authenticator.authenticate(&mut first).await;
        assert!(!first.extensions().get::<Authentication>().unwrap().has_role("ADMIN"));

        fx.store
            .set_roles("carol", vec![Role::User, Role::Admin])
            .await
            .unwrap();

        let mut second = request_with(Some(&header));
        fx.authenticator.authenticate(&mut second).await;
        assert!(second.extensions().get::<Authentication>().unwrap().has_role("ADMIN"));
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(AuthFailure::Token(TokenError::Expired).kind(), "expired");
        assert_eq!(
            AuthFailure::Principal(ResolveError::PrincipalNotFound).kind(),
            "principal_not_found"
        );
        assert_eq!(AuthFailure::SubjectMismatch.kind(), "subject_mismatch");
    }
}
