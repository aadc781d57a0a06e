//! In-process refresh token store.
//!
//! Every operation holds one lock for its whole duration, which gives
//! `rotate_atomic` the same all-or-nothing behaviour as the Postgres
//! transaction.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::{NewRefreshRecord, RecordId, RecordStatus, RefreshTokenRecord, UserId};
use crate::configuration::RotationPolicy;
use crate::error::{AppError, AuthError, DatabaseError};

use super::RefreshTokenStore;

#[derive(Clone, Default)]
pub struct InMemoryRefreshTokenStore {
    records: Arc<Mutex<HashMap<RecordId, RefreshTokenRecord>>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record owned by `user_id`, oldest first
    pub async fn records_for_user(&self, user_id: UserId) -> Vec<RefreshTokenRecord> {
        let records = self.records.lock().await;
        let mut owned: Vec<_> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|r| r.created_at);
        owned
    }
}

fn insert_unique(
    records: &mut HashMap<RecordId, RefreshTokenRecord>,
    record: NewRefreshRecord,
) -> Result<RecordId, AppError> {
    if records.contains_key(&record.id) {
        return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
            "refresh record id already exists".to_string(),
        )));
    }
    let id = record.id;
    records.insert(id, record.into());
    Ok(id)
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert_record(&self, record: NewRefreshRecord) -> Result<RecordId, AppError> {
        let mut records = self.records.lock().await;
        insert_unique(&mut records, record)
    }

    async fn find_record(
        &self,
        user_id: UserId,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .find(|r| r.user_id == user_id && r.token_hash == token_hash)
            .cloned())
    }

    async fn rotate_atomic(
        &self,
        old_id: RecordId,
        new_record: NewRefreshRecord,
        policy: RotationPolicy,
    ) -> Result<RecordId, AppError> {
        let rotated_at = new_record.created_at;
        let user_id = new_record.user_id;
        let mut records = self.records.lock().await;

        match records.get(&old_id) {
            Some(old) if old.is_active() => {}
            _ => return Err(AuthError::TokenAlreadyRotated.into()),
        }

        let new_id = insert_unique(&mut records, new_record)?;

        for record in records.values_mut() {
            let retire = record.id == old_id
                || (policy == RotationPolicy::RevokeOtherSessions
                    && record.user_id == user_id
                    && record.id != new_id);
            if retire && record.is_active() {
                record.status = RecordStatus::Inactive;
                record.deactivated_at = Some(rotated_at);
            }
        }

        Ok(new_id)
    }

    async fn deactivate(&self, user_id: UserId, token_hash: &str) -> Result<bool, AppError> {
        let mut records = self.records.lock().await;
        let now = Utc::now();

        match records
            .values_mut()
            .find(|r| r.user_id == user_id && r.token_hash == token_hash && r.is_active())
        {
            Some(record) => {
                record.status = RecordStatus::Inactive;
                record.deactivated_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_all_for_user(&self, user_id: UserId) -> Result<u64, AppError> {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        let mut count = 0;

        for record in records.values_mut() {
            if record.user_id == user_id && record.is_active() {
                record.status = RecordStatus::Inactive;
                record.deactivated_at = Some(now);
                count += 1;
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_token;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn new_record(user_id: i64, refresh_token: &str) -> NewRefreshRecord {
        let now = Utc::now();
        NewRefreshRecord {
            id: Uuid::new_v4(),
            user_id: UserId(user_id),
            access_token: "access".to_string(),
            token_hash: hash_token(refresh_token),
            expires_at: now + Duration::days(7),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryRefreshTokenStore::new();
        let id = store.insert_record(new_record(42, "r1")).await.unwrap();

        let found = store
            .find_record(UserId(42), &hash_token("r1"))
            .await
            .unwrap()
            .expect("record should exist");
        assert_eq!(found.id, id);
        assert!(found.is_active());
    }

    #[tokio::test]
    async fn test_find_is_scoped_to_owner() {
        let store = InMemoryRefreshTokenStore::new();
        store.insert_record(new_record(42, "r1")).await.unwrap();

        let found = store.find_record(UserId(7), &hash_token("r1")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_rotate_retires_old_and_inserts_new() {
        let store = InMemoryRefreshTokenStore::new();
        let old_id = store.insert_record(new_record(42, "r1")).await.unwrap();

        let new_id = store
            .rotate_atomic(old_id, new_record(42, "r2"), RotationPolicy::SingleSession)
            .await
            .unwrap();

        let old = store.find_record(UserId(42), &hash_token("r1")).await.unwrap().unwrap();
        let new = store.find_record(UserId(42), &hash_token("r2")).await.unwrap().unwrap();
        assert_eq!(old.status, RecordStatus::Inactive);
        assert!(old.deactivated_at.is_some());
        assert_eq!(new.id, new_id);
        assert!(new.is_active());
    }

    #[tokio::test]
    async fn test_second_rotation_of_same_record_conflicts() {
        let store = InMemoryRefreshTokenStore::new();
        let old_id = store.insert_record(new_record(42, "r1")).await.unwrap();

        store
            .rotate_atomic(old_id, new_record(42, "r2"), RotationPolicy::SingleSession)
            .await
            .unwrap();
        let err = store
            .rotate_atomic(old_id, new_record(42, "r3"), RotationPolicy::SingleSession)
            .await
            .unwrap_err();

        assert_eq!(err.auth_error(), Some(AuthError::TokenAlreadyRotated));
        assert!(store
            .find_record(UserId(42), &hash_token("r3"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_single_session_policy_keeps_other_devices() {
        let store = InMemoryRefreshTokenStore::new();
        let phone = store.insert_record(new_record(42, "phone")).await.unwrap();
        store.insert_record(new_record(42, "laptop")).await.unwrap();

        store
            .rotate_atomic(phone, new_record(42, "phone-2"), RotationPolicy::SingleSession)
            .await
            .unwrap();

        let laptop = store
            .find_record(UserId(42), &hash_token("laptop"))
            .await
            .unwrap()
            .unwrap();
        assert!(laptop.is_active());
    }

    #[tokio::test]
    async fn test_revoke_other_sessions_policy() {
        let store = InMemoryRefreshTokenStore::new();
        let phone = store.insert_record(new_record(42, "phone")).await.unwrap();
        store.insert_record(new_record(42, "laptop")).await.unwrap();
        store.insert_record(new_record(7, "someone-else")).await.unwrap();

        store
            .rotate_atomic(phone, new_record(42, "phone-2"), RotationPolicy::RevokeOtherSessions)
            .await
            .unwrap();

        let active: Vec<_> = store
            .records_for_user(UserId(42))
            .await
            .into_iter()
            .filter(|r| r.is_active())
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token_hash, hash_token("phone-2"));

        let other = store
            .find_record(UserId(7), &hash_token("someone-else"))
            .await
            .unwrap()
            .unwrap();
        assert!(other.is_active());
    }

    #[tokio::test]
    async fn test_deactivate_all_for_user() {
        let store = InMemoryRefreshTokenStore::new();
        store.insert_record(new_record(42, "a")).await.unwrap();
        store.insert_record(new_record(42, "b")).await.unwrap();

        assert_eq!(store.deactivate_all_for_user(UserId(42)).await.unwrap(), 2);
        assert_eq!(store.deactivate_all_for_user(UserId(42)).await.unwrap(), 0);
        assert!(!store.deactivate(UserId(42), &hash_token("a")).await.unwrap());
    }
}
