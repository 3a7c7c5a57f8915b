//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use clap::Parser;
use std::net::IpAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Proxy header to read the client IP from, when running behind a reverse proxy.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// First entry of `X-Forwarded-For`
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
}

impl ClientIpHeader {
    pub fn header_name(self) -> &'static str {
        match self {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
        }
    }

    /// Parse the client IP out of a header value.
    pub fn extract(self, value: &str) -> Result<String, &'static str> {
        let candidate = match self {
            ClientIpHeader::XForwardedFor => value.split(',').next().unwrap_or_default(),
            ClientIpHeader::XRealIp => value,
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid address")
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ticklist", about = "Multi-user to-do service with token authentication")]
pub struct Args {
    /// Base path prefix for every route (e.g. "/api")
    #[arg(short, long, value_parser = validate_base_path)]
    pub base: Option<String>,

    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file, or ":memory:"
    #[arg(short, long, default_value = "ticklist.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// bcrypt work factor for password and session hashing
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Read the client IP from this proxy header instead of the socket address
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Disable per-IP rate limiting
    #[arg(long)]
    pub no_rate_limit: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_base_path(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Ok(String::new());
    }

    if !s.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Base path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Base path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format. Filtering follows `RUST_LOG`, defaulting to info.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        base: args.base.clone().filter(|base| !base.is_empty()),
        db,
        jwt_secret: jwt_secret.into_bytes(),
        bcrypt_cost: args.bcrypt_cost,
        ip_header: args.ip_header,
        rate_limit: !args.no_rate_limit,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_base_path() {
        assert_eq!(validate_base_path("").unwrap(), "");
        assert_eq!(validate_base_path("/api").unwrap(), "/api");
        assert_eq!(validate_base_path("/v1/api").unwrap(), "/v1/api");
        assert!(validate_base_path("api").is_err());
        assert!(validate_base_path("/api/").is_err());
        assert!(validate_base_path("/my api").is_err());
        assert!(validate_base_path("/ápi").is_err());
    }

    #[test]
    fn test_ip_header_extract() {
        assert_eq!(
            ClientIpHeader::XForwardedFor
                .extract("198.51.100.7, 10.0.0.1, 10.0.0.2")
                .unwrap(),
            "198.51.100.7"
        );
        assert_eq!(
            ClientIpHeader::XRealIp.extract(" 2001:db8::1 ").unwrap(),
            "2001:db8::1"
        );
        assert!(ClientIpHeader::XRealIp.extract("").is_err());
        assert!(ClientIpHeader::XForwardedFor.extract("unknown").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["ticklist"]);
        assert_eq!(args.port, 3000);
        assert_eq!(args.database, "ticklist.db");
        assert_eq!(args.bcrypt_cost, 10);
        assert!(args.ip_header.is_none());
        assert!(!args.no_rate_limit);
    }

    #[test]
    fn test_args_parse_options() {
        let args = Args::parse_from([
            "ticklist",
            "--base",
            "/api",
            "--ip-header",
            "x-forwarded-for",
            "--bcrypt-cost",
            "12",
            "--no-rate-limit",
        ]);
        assert_eq!(args.base.as_deref(), Some("/api"));
        assert_eq!(args.ip_header, Some(ClientIpHeader::XForwardedFor));
        assert_eq!(args.bcrypt_cost, 12);
        assert!(args.no_rate_limit);

        assert!(Args::try_parse_from(["ticklist", "--bcrypt-cost", "3"]).is_err());
        assert!(Args::try_parse_from(["ticklist", "--bcrypt-cost", "32"]).is_err());
    }

    #[tokio::test]
    async fn test_build_config() {
        let args = Args::parse_from(["ticklist", "--base", "", "--no-rate-limit"]);
        let db = Database::open(":memory:").await.unwrap();

        let config = build_config(&args, db, "x".repeat(32));
        assert!(config.base.is_none());
        assert!(!config.rate_limit);
        assert_eq!(config.jwt_secret.len(), 32);
        assert_eq!(config.bcrypt_cost, 10);
    }
}
