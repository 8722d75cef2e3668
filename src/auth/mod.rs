//! Stateless bearer-token authentication.
//!
//! Three pieces, leaf to root:
//!
//! - **Token codec** ([`TokenCodec`]): signs and verifies HS256 JWTs carrying
//!   `sub`, `iat` and `exp`. Knows nothing about users or requests.
//! - **Principal resolver** ([`PrincipalResolver`]): turns a username into a
//!   [`Principal`] by asking the [`CredentialStore`], mapping each role to a
//!   `ROLE_` authority.
//! - **Request authenticator** ([`RequestAuthenticator`]): runs once per
//!   request, validates the `Authorization: Bearer` token and installs an
//!   [`Authentication`] into the request's extensions on success.
//!
//! ## Security Model
//!
//! - Tokens are never stored; validity is recomputed from the token bytes
//! - Principals are rebuilt from the store on every request, so role changes
//!   apply immediately
//! - Authentication failures are silent; handlers that need a principal
//!   reject the request when none was installed
//!
//! ## Usage
//!
//! ```ignore
//! let codec = Arc::new(TokenCodec::from_config(&config.jwt)?);
//! let authenticator = Arc::new(RequestAuthenticator::new(
//!     codec.clone(),
//!     PrincipalResolver::new(store.clone()),
//! ));
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .layer(middleware::from_fn_with_state(authenticator, authenticate_request));
//! ```

mod authenticator;
mod clock;
mod context;
mod login;
mod password;
mod principal;
mod store;
mod token;


pub use authenticator::{
    AuthFailure, AuthOutcome, BEARER_PREFIX, RequestAuthenticator, authenticate_request,
    bearer_token,
};
pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub(crate) use clock::ManualClock;
pub use context::Authentication;
pub use login::{LoginError, LoginService, SignupError};
pub use password::{Argon2PasswordVerifier, PasswordVerifier};
pub use principal::{HasAuthorities, Principal, PrincipalResolver, ROLE_PREFIX, ResolveError};
pub use store::{CredentialStore, DuplicateUsername, InMemoryCredentialStore};
pub use token::{Claims, SigningKey, TokenCodec, TokenError};
