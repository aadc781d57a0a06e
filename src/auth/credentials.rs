//! Credential verification seam used by login.
//!
//! User records are owned by the user management service; this module only
//! reads them to turn a username/password into a `UserId`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::auth::claims::UserId;
use crate::auth::password::{hash_password, verify_stored_password};
use crate::error::AppError;

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns the user's id when the credentials match, `None` otherwise.
    ///
    /// Unknown usernames and wrong passwords are indistinguishable.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<UserId>, AppError>;
}

/// Reads `users(id, username, password_hash)` from Postgres
pub struct PgCredentialVerifier {
    pool: PgPool,
}

impl PgCredentialVerifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialVerifier for PgCredentialVerifier {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<UserId>, AppError> {
        let user = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let stored_hash = user.as_ref().map(|(_, password_hash)| password_hash.as_str());
        if verify_stored_password(password, stored_hash)? {
            Ok(user.map(|(id, _)| UserId(id)))
        } else {
            Ok(None)
        }
    }
}

/// Fixed username → (id, bcrypt hash) table, for tests and local runs
#[derive(Default)]
pub struct StaticCredentials {
    users: HashMap<String, (UserId, String)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, hashing `password` with the given bcrypt cost
    pub fn with_user(
        mut self,
        username: &str,
        password: &str,
        user_id: UserId,
        cost: u32,
    ) -> Result<Self, AppError> {
        let password_hash = hash_password(password, cost)?;
        self.users
            .insert(username.to_string(), (user_id, password_hash));
        Ok(self)
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<UserId>, AppError> {
        let user = self.users.get(username);
        let stored_hash = user.map(|(_, password_hash)| password_hash.as_str());
        if verify_stored_password(password, stored_hash)? {
            Ok(user.map(|(user_id, _)| *user_id))
        } else {
            Ok(None)
        }
    }
}
