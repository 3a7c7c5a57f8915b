//! Session management: registration, login, refresh-token rotation and revocation.
//!
//! Every successful register, login or refresh opens a new session record and
//! returns a fresh access/refresh token pair. A refresh token redeems its
//! session exactly once; the record is deleted before the replacement is
//! issued, so a captured token that has already been used is worthless.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Database, RefreshToken, User, is_unique_violation};
use crate::jwt::{JwtConfig, JwtError};
use crate::password::{PasswordError, PasswordHasher};

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Email already exists")]
    Conflict,
    /// Unknown email or wrong password. The two are deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Unknown, foreign, consumed, expired or mismatched session.
    #[error("Access denied")]
    AccessDenied,
    #[error(transparent)]
    Token(#[from] JwtError),
    #[error(transparent)]
    Hash(#[from] PasswordError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    jwt: Arc<JwtConfig>,
    hasher: PasswordHasher,
}

impl SessionManager {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, hasher: PasswordHasher) -> Self {
        Self { db, jwt, hasher }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<TokenPair, SessionError> {
        // The UNIQUE constraint is authoritative; this only avoids a wasted hash.
        if self.db.users().get_by_email(email).await?.is_some() {
            return Err(SessionError::Conflict);
        }

        let password_hash = self.hasher.hash(password).await?;

        let user = match self.db.users().create(email, &password_hash).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => return Err(SessionError::Conflict),
            Err(e) => return Err(e.into()),
        };

        info!(user_id = user.id, "User registered");
        self.open_session(&user).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, SessionError> {
        let user = self
            .db
            .users()
            .get_by_email(email)
            .await?
            .ok_or(SessionError::InvalidCredentials)?;

        if !self.hasher.verify(password, &user.password_hash).await? {
            return Err(SessionError::InvalidCredentials);
        }

        info!(user_id = user.id, "User logged in");
        self.open_session(&user).await
    }

    /// Redeem a refresh token for session `session_id` and rotate it.
    pub async fn refresh(
        &self,
        user_id: i64,
        refresh_token: &str,
        session_id: &str,
    ) -> Result<TokenPair, SessionError> {
        let tokens = self.db.refresh_tokens();

        let record = tokens
            .get_by_id(session_id)
            .await?
            .filter(|record| record.user_id == user_id)
            .ok_or(SessionError::AccessDenied)?;

        if !self.hasher.verify(refresh_token, &record.token_hash).await? {
            warn!(user_id, session_id, "Refresh token does not match session");
            return Err(SessionError::AccessDenied);
        }

        if record.is_expired() {
            tokens.delete_by_id(session_id).await?;
            warn!(user_id, session_id, "Expired session presented for refresh");
            return Err(SessionError::AccessDenied);
        }

        // Conditional delete: a concurrent redemption of the same record loses here.
        if !tokens.delete_for_user(session_id, user_id).await? {
            warn!(user_id, session_id, "Session already redeemed");
            return Err(SessionError::AccessDenied);
        }

        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(SessionError::AccessDenied)?;

        self.open_session(&user).await
    }

    /// End one session belonging to `user_id`.
    pub async fn logout(&self, user_id: i64, session_id: &str) -> Result<(), SessionError> {
        if !self
            .db
            .refresh_tokens()
            .delete_for_user(session_id, user_id)
            .await?
        {
            return Err(SessionError::AccessDenied);
        }

        info!(user_id, session_id, "Session logged out");
        Ok(())
    }

    /// End every session belonging to `user_id`. Returns how many were removed.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, SessionError> {
        let revoked = self.db.refresh_tokens().delete_all_by_user(user_id).await?;
        info!(user_id, revoked, "All sessions logged out");
        Ok(revoked)
    }

    /// The user's unexpired sessions, newest first.
    pub async fn list_sessions(&self, user_id: i64) -> Result<Vec<RefreshToken>, SessionError> {
        Ok(self.db.refresh_tokens().list_by_user(user_id).await?)
    }

    /// Revoke one of the caller's sessions by id. Unknown and foreign ids both report false.
    pub async fn revoke_session(&self, user_id: i64, session_id: &str) -> Result<bool, SessionError> {
        let revoked = self
            .db
            .refresh_tokens()
            .delete_for_user(session_id, user_id)
            .await?;
        if revoked {
            info!(user_id, session_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Create a session record and mint the token pair for it.
    async fn open_session(&self, user: &User) -> Result<TokenPair, SessionError> {
        let session_id = uuid::Uuid::new_v4().to_string();

        let access = self.jwt.generate_access_token(user.id, &user.email)?;
        let refresh = self
            .jwt
            .generate_refresh_token(user.id, &user.email, &session_id)?;

        let token_hash = self.hasher.hash(&refresh.token).await?;
        let expires_at = DateTime::<Utc>::from_timestamp(refresh.expires_at as i64, 0)
            .ok_or(JwtError::TimeError)?;

        self.db
            .refresh_tokens()
            .create(&session_id, user.id, &token_hash, expires_at)
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }
}
