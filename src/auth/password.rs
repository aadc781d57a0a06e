/// Password Verification
///
/// Login checks a submitted password against a stored bcrypt hash.
/// Password policy and storage belong to the user management service.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::AppError;

const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    // Stand-in hash checked when the user does not exist
    static ref MISSING_USER_HASH: Option<String> =
        hash("missing-user-placeholder", DEFAULT_COST).ok();
}

/// Hash a password using bcrypt with the given cost
///
/// # Errors
/// Returns error if bcrypt hashing fails
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// Oversized inputs are rejected without running bcrypt.
///
/// # Errors
/// Returns error if the stored hash is not a valid bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Ok(false);
    }

    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Check a password against the stored hash of a user that may not exist
///
/// A missing user still costs one bcrypt verification, so response time
/// does not reveal whether the username is known.
pub fn verify_stored_password(password: &str, stored_hash: Option<&str>) -> Result<bool, AppError> {
    match stored_hash {
        Some(stored_hash) => verify_password(password, stored_hash),
        None => {
            if let Some(placeholder) = MISSING_USER_HASH.as_deref() {
                let _ = verify_password(password, placeholder);
            }
            Ok(false)
        }
    }
}
