pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod pagination;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::{Router, middleware};
use cli::ClientIpHeader;
use db::Database;
use jwt::JwtConfig;
use password::PasswordHasher;
use rate_limit::{RateLimitState, rate_limit_general};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub struct ServerConfig {
    /// Base path for every route (e.g., "/api")
    pub base: Option<String>,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// Proxy header to take the client IP from, instead of the socket address
    pub ip_header: Option<ClientIpHeader>,
    /// Whether per-IP rate limiting is enforced
    pub rate_limit: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret));
    let hasher = PasswordHasher::new(config.bcrypt_cost);
    let rate_limit = config
        .rate_limit
        .then(|| RateLimitState::new(config.ip_header));

    let mut app = create_api_router(config.db.clone(), jwt, hasher, rate_limit.clone());

    if let Some(rate_limit) = rate_limit {
        app = app.layer(middleware::from_fn_with_state(rate_limit, rate_limit_general));
    }

    // Nesting at "/" is not allowed; an empty or root base means no prefix.
    if let Some(base) = config.base.as_deref().filter(|base| !base.is_empty() && *base != "/") {
        app = Router::new().nest(base, app);
    }

    app.layer(TraceLayer::new_for_http())
}

/// Run cleanup tasks. Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
