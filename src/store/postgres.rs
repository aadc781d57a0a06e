//! Postgres-backed refresh token store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::auth::{NewRefreshRecord, RecordId, RecordStatus, RefreshTokenRecord, UserId};
use crate::configuration::RotationPolicy;
use crate::error::{AppError, AuthError, DatabaseError};

use super::RefreshTokenStore;

pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_in(
        tx: &mut Transaction<'static, Postgres>,
        record: &NewRefreshRecord,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (id, user_id, access_token, token_hash, expires_at, created_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id.0)
        .bind(&record.access_token)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(RecordStatus::Active.as_str())
        .execute(tx)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: i64,
    access_token: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    status: String,
    deactivated_at: Option<DateTime<Utc>>,
}

impl TryFrom<RefreshTokenRow> for RefreshTokenRecord {
    type Error = AppError;

    fn try_from(row: RefreshTokenRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<RecordStatus>()
            .map_err(|e| AppError::Database(DatabaseError::UnexpectedError(e)))?;

        Ok(Self {
            id: row.id,
            user_id: UserId(row.user_id),
            access_token: row.access_token,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
            status,
            deactivated_at: row.deactivated_at,
        })
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert_record(&self, record: NewRefreshRecord) -> Result<RecordId, AppError> {
        let mut tx = self.pool.begin().await?;
        Self::insert_in(&mut tx, &record).await?;
        tx.commit().await?;

        Ok(record.id)
    }

    async fn find_record(
        &self,
        user_id: UserId,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, access_token, token_hash, expires_at, created_at,
                   status, deactivated_at
            FROM refresh_tokens
            WHERE user_id = $1 AND token_hash = $2
            "#,
        )
        .bind(user_id.0)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RefreshTokenRecord::try_from).transpose()
    }

    async fn rotate_atomic(
        &self,
        old_id: RecordId,
        new_record: NewRefreshRecord,
        policy: RotationPolicy,
    ) -> Result<RecordId, AppError> {
        let rotated_at = new_record.created_at;
        let mut tx = self.pool.begin().await?;

        // Conditional update is the compare-and-swap: a concurrent rotation
        // blocks on the row lock, then re-checks `status` and matches nothing.
        let deactivated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET status = 'inactive', deactivated_at = $1
            WHERE id = $2 AND status = 'active'
            "#,
        )
        .bind(rotated_at)
        .bind(old_id)
        .execute(&mut tx)
        .await?
        .rows_affected();

        if deactivated == 0 {
            tx.rollback().await?;
            return Err(AuthError::TokenAlreadyRotated.into());
        }

        Self::insert_in(&mut tx, &new_record).await?;

        if policy == RotationPolicy::RevokeOtherSessions {
            let revoked = sqlx::query(
                r#"
                UPDATE refresh_tokens
                SET status = 'inactive', deactivated_at = $1
                WHERE user_id = $2 AND status = 'active' AND id <> $3
                "#,
            )
            .bind(rotated_at)
            .bind(new_record.user_id.0)
            .bind(new_record.id)
            .execute(&mut tx)
            .await?
            .rows_affected();

            tracing::info!(
                user_id = %new_record.user_id,
                revoked = revoked,
                "Other sessions revoked on rotation"
            );
        }

        tx.commit().await?;

        Ok(new_record.id)
    }

    async fn deactivate(&self, user_id: UserId, token_hash: &str) -> Result<bool, AppError> {
        let changed = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET status = 'inactive', deactivated_at = $1
            WHERE user_id = $2 AND token_hash = $3 AND status = 'active'
            "#,
        )
        .bind(Utc::now())
        .bind(user_id.0)
        .bind(token_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(changed > 0)
    }

    async fn deactivate_all_for_user(&self, user_id: UserId) -> Result<u64, AppError> {
        let changed = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET status = 'inactive', deactivated_at = $1
            WHERE user_id = $2 AND status = 'active'
            "#,
        )
        .bind(Utc::now())
        .bind(user_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::info!(user_id = %user_id, revoked = changed, "All refresh tokens revoked for user");
        Ok(changed)
    }
}
