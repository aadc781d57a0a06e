/// JWT Claims structure
///
/// Represents the payload of an access token: the numeric user identity
/// plus the standard JWT claims (RFC 7519).

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Numeric identifier of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: UserId,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Unique token ID, keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// Create claims for `user_id` issued at `now`
    ///
    /// # Arguments
    /// * `user_id` - Subject of the token
    /// * `now` - Issue instant
    /// * `expiry_seconds` - Token lifetime in seconds from `now`
    /// * `issuer` - Issuer identifier
    pub fn new(user_id: UserId, now: DateTime<Utc>, expiry_seconds: i64, issuer: String) -> Self {
        let iat = now.timestamp();
        Self {
            sub: user_id,
            exp: iat.saturating_add(expiry_seconds),
            iat,
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Expiry as a UTC instant
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether the token is expired at `now`
    ///
    /// A token whose expiry equals `now` counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}
