//! Startup cleanup of expired data.
//!
//! A session whose refresh token has expired is rejected before its row is
//! looked up, so the row stays until this sweep.

use crate::db::Database;
use tracing::{error, info};

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    match db.refresh_tokens().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }
}
