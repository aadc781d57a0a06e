/// Refresh Token Records
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: a rotated record turns `Inactive` and stays that way

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::claims::UserId;
use crate::auth::jwt::TokenPair;

const REFRESH_TOKEN_LENGTH: usize = 64;

/// Identifier of a persisted refresh record
pub type RecordId = Uuid;

/// Generate a new cryptographically secure refresh token
///
/// The token is returned in plaintext (this is what the client stores).
/// The server stores only the SHA-256 hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lifecycle of a refresh record. `Inactive` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "inactive" => Ok(RecordStatus::Inactive),
            other => Err(format!("unknown refresh record status: {}", other)),
        }
    }
}

/// A refresh record about to be inserted
#[derive(Debug, Clone)]
pub struct NewRefreshRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub access_token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewRefreshRecord {
    /// Build the record that persists `pair` for `user_id`
    pub fn for_pair(user_id: UserId, pair: &TokenPair, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            access_token: pair.access_token.clone(),
            token_hash: hash_token(&pair.refresh_token),
            expires_at: pair.refresh_expires_at,
            created_at: now,
        }
    }
}

/// A persisted refresh record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub access_token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: RecordStatus,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// A record expires at `expires_at` exactly.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl From<NewRefreshRecord> for RefreshTokenRecord {
    fn from(record: NewRefreshRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            access_token: record.access_token,
            token_hash: record.token_hash,
            expires_at: record.expires_at,
            created_at: record.created_at,
            status: RecordStatus::Active,
            deactivated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        // Token should be 64 characters
        assert_eq!(token.len(), 64);
        // Token should be alphanumeric
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_refresh_token();
        let hash1 = hash_token(&token);
        let hash2 = hash_token(&token);

        assert_eq!(hash1, hash2);
        assert_ne!(token, hash1);
        // SHA-256 hex
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        let token1 = generate_refresh_token();
        let token2 = generate_refresh_token();

        assert_ne!(token1, token2);
        assert_ne!(hash_token(&token1), hash_token(&token2));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [RecordStatus::Active, RecordStatus::Inactive] {
            assert_eq!(status.as_str().parse::<RecordStatus>(), Ok(status));
        }
        assert!("revoked".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_new_record_starts_active() {
        let now = Utc::now();
        let pair = TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            access_expires_at: now + Duration::minutes(15),
            refresh_expires_at: now + Duration::days(7),
        };
        let record: RefreshTokenRecord = NewRefreshRecord::for_pair(UserId(42), &pair, now).into();

        assert!(record.is_active());
        assert_eq!(record.token_hash, hash_token("refresh"));
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + Duration::days(7)));
    }
}
