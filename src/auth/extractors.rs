//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::{debug, warn};

use super::cookie::{REFRESH_COOKIE_NAME, get_cookie};
use super::errors::{AuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::{AuthenticatedSession, AuthenticatedUser};

/// Header carrying the refresh token. Takes precedence over the cookie.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Extract the token from `Authorization: Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extract the refresh token from the `X-Refresh-Token` header or the `refresh_token` cookie.
pub fn refresh_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .or_else(|| get_cookie(headers, REFRESH_COOKIE_NAME).filter(|token| !token.is_empty()))
}

fn authenticate_access<S>(parts: &Parts, state: &S) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend,
{
    let token = bearer_token(&parts.headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = state.jwt().validate_access_token(token).map_err(|e| {
        debug!(error = %e, "Rejected access token");
        AuthErrorKind::InvalidToken
    })?;

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        email: claims.email.clone(),
        claims,
    })
}

fn authenticate_session<S>(parts: &Parts, state: &S) -> Result<AuthenticatedSession, AuthErrorKind>
where
    S: HasAuthBackend,
{
    let user = authenticate_access(parts, state)?;

    let token = refresh_token(&parts.headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = state.jwt().validate_refresh_token(token).map_err(|e| {
        debug!(error = %e, "Rejected refresh token");
        AuthErrorKind::InvalidToken
    })?;

    if claims.sub != user.user_id || claims.email != user.email {
        warn!(
            user_id = user.user_id,
            refresh_sub = claims.sub,
            "Refresh token does not belong to access token holder"
        );
        return Err(AuthErrorKind::TokenMismatch);
    }

    Ok(AuthenticatedSession {
        user,
        session_id: claims.sid,
        refresh_token: token.to_string(),
    })
}

/// Extractor for endpoints that require a valid access token.
pub struct AccessAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for AccessAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_access(parts, state)
            .map(AccessAuth)
            .map_err(AuthError::from)
    }
}

/// Extractor for endpoints that act on the caller's current session
/// (refresh, logout). Requires a valid access token and a refresh token for
/// the same user.
pub struct RefreshAuth(pub AuthenticatedSession);

impl<S> FromRequestParts<S> for RefreshAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_session(parts, state)
            .map(RefreshAuth)
            .map_err(AuthError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtConfig;
    use axum::http::{HeaderValue, Request};
    use std::sync::Arc;

    #[derive(Clone)]
    struct TestState {
        jwt: Arc<JwtConfig>,
    }

    crate::impl_has_auth_backend!(TestState);

    fn state() -> TestState {
        TestState {
            jwt: Arc::new(JwtConfig::new(b"test-jwt-secret")),
        }
    }

    fn parts(headers: &[(&str, String)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  abc "));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_refresh_token_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("refresh_token=cookie"));
        assert_eq!(refresh_token(&headers), Some("cookie"));

        headers.insert(REFRESH_TOKEN_HEADER, HeaderValue::from_static("header"));
        assert_eq!(refresh_token(&headers), Some("header"));

        headers.insert(REFRESH_TOKEN_HEADER, HeaderValue::from_static(""));
        assert_eq!(refresh_token(&headers), Some("cookie"));
    }

    #[tokio::test]
    async fn test_access_auth_accepts_valid_token() {
        let state = state();
        let token = state.jwt.generate_access_token(7, "a@x.com").unwrap().token;
        let mut parts = parts(&[("authorization", format!("Bearer {token}"))]);

        let AccessAuth(user) = AccessAuth::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(user.user_id, 7);
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_access_auth_rejects_missing_and_invalid() {
        let state = state();

        let mut missing = parts(&[]);
        let err = AccessAuth::from_request_parts(&mut missing, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::NotAuthenticated);

        let mut garbage = parts(&[("authorization", "Bearer not.a.jwt".to_string())]);
        let err = AccessAuth::from_request_parts(&mut garbage, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::InvalidToken);

        let foreign = JwtConfig::new(b"some-other-secret")
            .generate_access_token(7, "a@x.com")
            .unwrap()
            .token;
        let mut forged = parts(&[("authorization", format!("Bearer {foreign}"))]);
        let err = AccessAuth::from_request_parts(&mut forged, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn test_access_auth_rejects_refresh_token() {
        let state = state();
        let refresh = state
            .jwt
            .generate_refresh_token(7, "a@x.com", "sid")
            .unwrap()
            .token;
        let mut parts = parts(&[("authorization", format!("Bearer {refresh}"))]);

        let err = AccessAuth::from_request_parts(&mut parts, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::InvalidToken);
    }

    #[tokio::test]
    async fn test_refresh_auth_extracts_session() {
        let state = state();
        let access = state.jwt.generate_access_token(7, "a@x.com").unwrap().token;
        let refresh = state
            .jwt
            .generate_refresh_token(7, "a@x.com", "session-1")
            .unwrap()
            .token;
        let mut parts = parts(&[
            ("authorization", format!("Bearer {access}")),
            ("cookie", format!("refresh_token={refresh}")),
        ]);

        let RefreshAuth(session) = RefreshAuth::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(session.user.user_id, 7);
        assert_eq!(session.session_id, "session-1");
        assert_eq!(session.refresh_token, refresh);
    }

    #[tokio::test]
    async fn test_refresh_auth_requires_matching_user() {
        let state = state();
        let access = state.jwt.generate_access_token(7, "a@x.com").unwrap().token;

        let other_user = state
            .jwt
            .generate_refresh_token(8, "a@x.com", "sid")
            .unwrap()
            .token;
        let mut parts_a = parts(&[
            ("authorization", format!("Bearer {access}")),
            ("x-refresh-token", other_user),
        ]);
        let err = RefreshAuth::from_request_parts(&mut parts_a, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::TokenMismatch);

        let other_email = state
            .jwt
            .generate_refresh_token(7, "b@x.com", "sid")
            .unwrap()
            .token;
        let mut parts_b = parts(&[
            ("authorization", format!("Bearer {access}")),
            ("x-refresh-token", other_email),
        ]);
        let err = RefreshAuth::from_request_parts(&mut parts_b, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::TokenMismatch);
    }

    #[tokio::test]
    async fn test_refresh_auth_requires_both_tokens() {
        let state = state();
        let access = state.jwt.generate_access_token(7, "a@x.com").unwrap().token;
        let refresh = state
            .jwt
            .generate_refresh_token(7, "a@x.com", "sid")
            .unwrap()
            .token;

        let mut only_access = parts(&[("authorization", format!("Bearer {access}"))]);
        let err = RefreshAuth::from_request_parts(&mut only_access, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::NotAuthenticated);

        let mut only_refresh = parts(&[("x-refresh-token", refresh)]);
        let err = RefreshAuth::from_request_parts(&mut only_refresh, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::NotAuthenticated);

        // An access token in the refresh slot is the wrong kind.
        let mut swapped = parts(&[
            ("authorization", format!("Bearer {access}")),
            ("x-refresh-token", access.clone()),
        ]);
        let err = RefreshAuth::from_request_parts(&mut swapped, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::InvalidToken);
    }
}
