//! Authentication user types.

use crate::jwt::AccessClaims;

/// Caller identity decoded from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub claims: AccessClaims,
}

/// Caller identity plus the session its refresh token redeems.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user: AuthenticatedUser,
    /// Session record named by the refresh token's `sid` claim
    pub session_id: String,
    /// The presented refresh token, verified against the stored hash by the session manager
    pub refresh_token: String,
}
