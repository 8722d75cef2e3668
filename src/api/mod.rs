// REST API endpoints: sign-up, sign-in and identity checks

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{
    Authentication, HasAuthorities, LoginError, LoginService, RequestAuthenticator, SignupError,
    authenticate_request,
};

#[derive(Clone)]
pub struct AppState {
    pub login: Arc<LoginService>,
}

/// Body of `/auth/signup` and `/auth/signin`.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Build the public router.
///
/// Every route runs behind the bearer-token authenticator. `/auth/**` and
/// `/health` never look at the result; the rest require an installed
/// `Authentication`.
pub fn create_router(state: AppState, authenticator: Arc<RequestAuthenticator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/me", get(current_user))
        .route("/admin/ping", get(admin_ping))
        .layer(middleware::from_fn_with_state(
            authenticator,
            authenticate_request,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> (StatusCode, String) {
    match state.login.sign_up(&payload.username, &payload.password).await {
        Ok(()) => (StatusCode::OK, "User registered successfully".to_string()),
        Err(e @ (SignupError::Invalid(_) | SignupError::UsernameTaken)) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(SignupError::Internal(msg)) => {
            tracing::error!("Sign-up failed: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
        }
    }
}

async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<TokenResponse>, (StatusCode, String)> {
    match state.login.sign_in(&payload.username, &payload.password).await {
        Ok(token) => Ok(Json(TokenResponse { token })),
        Err(e @ LoginError::Invalid(_)) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(LoginError::BadCredentials) => Err((StatusCode::UNAUTHORIZED, String::new())),
        Err(e) => {
            tracing::error!("Sign-in failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, String::new()))
        }
    }
}

/// Identity of the caller as the authenticator resolved it.
async fn current_user(auth: Authentication) -> Json<Value> {
    Json(serde_json::json!({
        "username": auth.username(),
        "authorities": auth.authorities(),
    }))
}

async fn admin_ping(auth: Authentication) -> Result<Json<Value>, StatusCode> {
    auth.require_authority("ROLE_ADMIN")?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "username": auth.username(),
    })))
}
