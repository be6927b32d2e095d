//! Password hashing
//!
//! Passwords are stored as bcrypt hashes (salt and cost embedded in the
//! stored string). Hashing runs on the blocking pool.

use tracing::{error, warn};

use crate::error::CredentialError;

/// bcrypt work factor
pub const HASH_COST: u32 = 10;

/// Hash a password with a fresh random salt
pub async fn hash_password(password: &str) -> Result<String, CredentialError> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, HASH_COST)).await??;
    Ok(hash)
}

/// Check a password against a stored hash
///
/// Malformed stored values never verify.
pub async fn verify_password(password: &str, stored: &str) -> bool {
    let password = password.to_string();
    let stored = stored.to_string();

    match tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored)).await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            warn!("Unreadable password hash: {}", e);
            false
        }
        Err(e) => {
            error!("Password check task failed: {}", e);
            false
        }
    }
}
