mod auth;
mod error;
mod todos;
mod validate;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::password::PasswordHasher;
use crate::rate_limit::RateLimitState;
use crate::session::SessionManager;

pub use auth::AuthState;
pub use error::{ApiError, ResultExt};
pub use todos::TodosState;
pub use validate::{ValidatedJson, ValidatedPath, ValidatedQuery};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    hasher: PasswordHasher,
    rate_limit: Option<RateLimitState>,
) -> Router {
    let auth_state = AuthState {
        jwt: jwt.clone(),
        sessions: SessionManager::new(db.clone(), jwt.clone(), hasher),
        rate_limit,
    };

    let todos_state = TodosState { db, jwt };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/todos", todos::router(todos_state))
}
