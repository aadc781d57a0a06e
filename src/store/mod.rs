/// Refresh Token Store
///
/// Durable refresh records and the atomic rotation step. Two backends:
/// Postgres for the running service and an in-process store for tests
/// and local runs.

mod memory;
mod postgres;

pub use memory::InMemoryRefreshTokenStore;
pub use postgres::PgRefreshTokenStore;

use async_trait::async_trait;

use crate::auth::{NewRefreshRecord, RecordId, RefreshTokenRecord, UserId};
use crate::configuration::RotationPolicy;
use crate::error::AppError;

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a new `Active` record
    ///
    /// # Errors
    /// Returns a database error if the storage layer is unavailable.
    async fn insert_record(&self, record: NewRefreshRecord) -> Result<RecordId, AppError>;

    /// Find the record owned by `user_id` with the given token hash, in any status
    async fn find_record(
        &self,
        user_id: UserId,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Retire `old_id` and insert `new_record` as one atomic step
    ///
    /// The old record is deactivated only if it is still `Active`. When it
    /// is not, nothing is written and `AuthError::TokenAlreadyRotated` is
    /// returned, so of two concurrent rotations of the same record exactly
    /// one succeeds. Under `RotationPolicy::RevokeOtherSessions` every other
    /// active record of the user is retired in the same step.
    async fn rotate_atomic(
        &self,
        old_id: RecordId,
        new_record: NewRefreshRecord,
        policy: RotationPolicy,
    ) -> Result<RecordId, AppError>;

    /// Deactivate one active record. Returns whether a record changed.
    async fn deactivate(&self, user_id: UserId, token_hash: &str) -> Result<bool, AppError>;

    /// Deactivate every active record of `user_id`. Returns how many changed.
    async fn deactivate_all_for_user(&self, user_id: UserId) -> Result<u64, AppError>;
}
