//! One-way salted hashing for account passwords and refresh-token secrets.
//!
//! bcrypt is deliberately slow, so every hash and verify runs on tokio's
//! blocking pool instead of the request-handling workers.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// bcrypt work factor used in production.
pub const DEFAULT_COST: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password or opaque token secret for storage.
    ///
    /// bcrypt ignores input past 72 bytes, so the secret is condensed with
    /// SHA-256 first and long secrets sharing a prefix stay distinct.
    pub async fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        let cost = self.cost;
        let condensed = condense(secret);
        let digest = tokio::task::spawn_blocking(move || bcrypt::hash(condensed, cost)).await??;
        Ok(digest)
    }

    /// Check a secret against a stored digest.
    /// A malformed digest is an error, never a match.
    pub async fn verify(&self, secret: &str, digest: &str) -> Result<bool, PasswordError> {
        let condensed = condense(secret);
        let digest = digest.to_owned();
        let matches =
            tokio::task::spawn_blocking(move || bcrypt::verify(condensed, &digest)).await??;
        Ok(matches)
    }
}

fn condense(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}
