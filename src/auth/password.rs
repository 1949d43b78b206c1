//! bcrypt password hashing.
//!
//! bcrypt is deliberately slow, so both operations run on the blocking pool
//! instead of stalling the async workers.

use crate::error::{AppError, AppResult};

pub async fn hash(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {}", e)))?
        .map_err(AppError::from)
}

/// Check `password` against a stored hash. A malformed hash counts as a
/// mismatch so one corrupt row cannot fail every login for its email.
pub async fn verify(password: String, hash: String) -> AppResult<bool> {
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))?;

    match result {
        Ok(matched) => Ok(matched),
        Err(e) => {
            tracing::warn!("Unreadable password hash: {}", e);
            Ok(false)
        }
    }
}
