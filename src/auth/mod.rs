//! Bearer token authentication.
//!
//! Access tokens (15 minutes, stateless) travel in the `Authorization` header.
//! Endpoints that redeem or end a session also take the refresh token, from
//! `X-Refresh-Token` or the `refresh_token` cookie, and require it to name the
//! same user as the access token.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{REFRESH_COOKIE_NAME, get_cookie};
pub use errors::AuthError;
pub use extractors::{AccessAuth, REFRESH_TOKEN_HEADER, RefreshAuth, bearer_token, refresh_token};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::{AuthenticatedSession, AuthenticatedUser};
