//! Account and session endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::error::ApiError;
use super::validate::{ValidatedJson, ValidatedPath};
use crate::auth::{AccessAuth, RefreshAuth, refresh_token};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitState, rate_limit_credentials};
use crate::session::SessionManager;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtConfig>,
    pub sessions: SessionManager,
    /// Credential rate limiting for register and login; `None` disables it
    pub rate_limit: Option<RateLimitState>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let credentials = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state.clone());

    let credentials = match state.rate_limit.clone() {
        Some(rate_limit) => credentials.layer(middleware::from_fn_with_state(
            rate_limit,
            rate_limit_credentials,
        )),
        None => credentials,
    };

    let sessions = Router::new()
        .route("/me", get(me))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(revoke_session))
        .with_state(state);

    Router::new().merge(credentials).merge(sessions)
}

#[derive(Debug, Deserialize, Validate)]
struct CredentialsRequest {
    #[validate(email(message = "email must be a valid email address"))]
    email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    user_id: i64,
    email: String,
}

#[derive(Serialize)]
struct LogoutResponse {
    success: bool,
}

#[derive(Serialize)]
struct LogoutAllResponse {
    success: bool,
    revoked: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// True for the session of the refresh token sent with this request
    current: bool,
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionInfo>,
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

async fn register(
    State(state): State<AuthState>,
    ValidatedJson(payload): ValidatedJson<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .sessions
        .register(&payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

async fn login(
    State(state): State<AuthState>,
    ValidatedJson(payload): ValidatedJson<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .sessions
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(pair))
}

async fn me(AccessAuth(user): AccessAuth) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        email: user.email,
    })
}

async fn refresh(
    State(state): State<AuthState>,
    RefreshAuth(session): RefreshAuth,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .sessions
        .refresh(
            session.user.user_id,
            &session.refresh_token,
            &session.session_id,
        )
        .await?;
    Ok(Json(pair))
}

async fn logout(
    State(state): State<AuthState>,
    RefreshAuth(session): RefreshAuth,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sessions
        .logout(session.user.user_id, &session.session_id)
        .await?;
    Ok(Json(LogoutResponse { success: true }))
}

async fn logout_all(
    State(state): State<AuthState>,
    AccessAuth(user): AccessAuth,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.sessions.logout_all(user.user_id).await?;
    Ok(Json(LogoutAllResponse {
        success: true,
        revoked,
    }))
}

async fn list_sessions(
    State(state): State<AuthState>,
    AccessAuth(user): AccessAuth,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    // Mark the caller's own session when a refresh token for the same user came along.
    let current = refresh_token(&headers)
        .and_then(|token| state.jwt.validate_refresh_token(token).ok())
        .filter(|claims| claims.sub == user.user_id)
        .map(|claims| claims.sid);

    let sessions = state
        .sessions
        .list_sessions(user.user_id)
        .await?
        .into_iter()
        .map(|record| SessionInfo {
            current: current.as_deref() == Some(record.id.as_str()),
            id: record.id,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
        .collect();

    Ok(Json(SessionsResponse { sessions }))
}

async fn revoke_session(
    State(state): State<AuthState>,
    AccessAuth(user): AccessAuth,
    ValidatedPath(id): ValidatedPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.sessions.revoke_session(user.user_id, &id).await?;
    Ok(Json(RevokeResponse { revoked }))
}
