/// Token Service
///
/// Composes the issuer and the refresh token store into the two inbound
/// operations: issuing a pair at login and rotating a pair on refresh.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth::claims::UserId;
use crate::auth::jwt::{TokenIssuer, TokenPair};
use crate::auth::refresh_token::{hash_token, NewRefreshRecord};
use crate::configuration::RotationPolicy;
use crate::error::{AppError, AuthError};
use crate::store::RefreshTokenStore;

pub struct TokenService {
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn RefreshTokenStore>,
    policy: RotationPolicy,
}

impl TokenService {
    pub fn new(issuer: Arc<TokenIssuer>, store: Arc<dyn RefreshTokenStore>) -> Self {
        let policy = issuer.settings().rotation_policy;
        Self {
            issuer,
            store,
            policy,
        }
    }

    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Issue a pair for an already authenticated user and persist its
    /// refresh record
    ///
    /// # Errors
    /// Returns a database error if the record cannot be stored.
    pub async fn login_and_issue(&self, user_id: UserId) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        let pair = self.issuer.issue_tokens_at(user_id, now)?;
        let record_id = self
            .store
            .insert_record(NewRefreshRecord::for_pair(user_id, &pair, now))
            .await?;

        tracing::info!(user_id = %user_id, record_id = %record_id, "Token pair issued");
        Ok(pair)
    }

    /// Exchange an expired access token and its refresh token for a new pair
    pub async fn rotate(&self, expired_token: &str, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.rotate_at(expired_token, refresh_token, Utc::now()).await
    }

    /// `rotate` evaluated at `now`
    ///
    /// Both the access token expiry and the refresh record expiry are
    /// compared against this single instant.
    ///
    /// # Errors
    /// - `MalformedToken`: access token cannot be decoded
    /// - `TokenNotExpired`: access token is still valid
    /// - `UnknownRefreshToken`: no record for this subject and refresh token
    /// - `TokenAlreadyRotated`: record is inactive, or lost a concurrent rotation
    /// - `RefreshTokenExpired`: record is past its expiry
    /// - database errors from the store
    pub async fn rotate_at(
        &self,
        expired_token: &str,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AppError> {
        let claims = self.issuer.decode_unverified(expired_token)?;
        let user_id = claims.sub;

        if !claims.is_expired_at(now) {
            return Err(AuthError::TokenNotExpired.into());
        }

        let record = self
            .store
            .find_record(user_id, &hash_token(refresh_token))
            .await?
            .ok_or(AuthError::UnknownRefreshToken)?;

        if !record.is_active() {
            tracing::warn!(
                user_id = %user_id,
                record_id = %record.id,
                "Rotated-out refresh token presented again, possible token reuse"
            );
            return Err(AuthError::TokenAlreadyRotated.into());
        }

        if record.is_expired_at(now) {
            return Err(AuthError::RefreshTokenExpired.into());
        }

        let pair = self.issuer.issue_tokens_at(user_id, now)?;
        let new_id = self
            .store
            .rotate_atomic(
                record.id,
                NewRefreshRecord::for_pair(user_id, &pair, now),
                self.policy,
            )
            .await
            .map_err(|e| {
                if e.auth_error() == Some(AuthError::TokenAlreadyRotated) {
                    tracing::warn!(
                        user_id = %user_id,
                        record_id = %record.id,
                        "Lost concurrent rotation of refresh token"
                    );
                }
                e
            })?;

        tracing::info!(
            user_id = %user_id,
            old_record_id = %record.id,
            new_record_id = %new_id,
            "Refresh token rotated"
        );
        Ok(pair)
    }

    /// Retire the session identified by `refresh_token`
    ///
    /// # Errors
    /// Returns `UnknownRefreshToken` if the user has no active record for it.
    pub async fn logout(&self, user_id: UserId, refresh_token: &str) -> Result<(), AppError> {
        if !self.store.deactivate(user_id, &hash_token(refresh_token)).await? {
            return Err(AuthError::UnknownRefreshToken.into());
        }

        tracing::info!(user_id = %user_id, "Session logged out");
        Ok(())
    }

    /// Retire every active session of `user_id`
    pub async fn logout_all(&self, user_id: UserId) -> Result<u64, AppError> {
        self.store.deactivate_all_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RecordStatus;
    use crate::configuration::JwtSettings;
    use crate::store::InMemoryRefreshTokenStore;
    use chrono::Duration;

    const ACCESS_LIFETIME: i64 = 900;

    fn settings(policy: RotationPolicy) -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: ACCESS_LIFETIME,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
            rotation_policy: policy,
        }
    }

    fn service_with(policy: RotationPolicy) -> (Arc<TokenService>, InMemoryRefreshTokenStore) {
        let store = InMemoryRefreshTokenStore::new();
        let issuer = Arc::new(TokenIssuer::new(settings(policy)).unwrap());
        let service = TokenService::new(issuer, Arc::new(store.clone()));
        (Arc::new(service), store)
    }

    fn service() -> (Arc<TokenService>, InMemoryRefreshTokenStore) {
        service_with(RotationPolicy::SingleSession)
    }

    fn after_access_expiry() -> DateTime<Utc> {
        Utc::now() + Duration::seconds(ACCESS_LIFETIME + 1)
    }

    fn reason(result: Result<TokenPair, AppError>) -> Option<AuthError> {
        result.err().and_then(|e| e.auth_error())
    }

    #[tokio::test]
    async fn test_login_persists_active_record() {
        let (service, store) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();

        let records = store.records_for_user(UserId(42)).await;
        assert_eq!(records.len(), 1);
        assert!(records[0].is_active());
        assert_eq!(records[0].access_token, pair.access_token);
        assert_eq!(records[0].token_hash, hash_token(&pair.refresh_token));
        assert_eq!(records[0].expires_at, pair.refresh_expires_at);
    }

    #[tokio::test]
    async fn test_rotation_scenario_for_user_42() {
        let (service, store) = service();
        let first = service.login_and_issue(UserId(42)).await.unwrap();
        let later = after_access_expiry();

        let second = service
            .rotate_at(&first.access_token, &first.refresh_token, later)
            .await
            .unwrap();

        assert_ne!(second.access_token, first.access_token);
        assert_ne!(second.refresh_token, first.refresh_token);

        let records = store.records_for_user(UserId(42)).await;
        assert_eq!(records.len(), 2);
        let old = records
            .iter()
            .find(|r| r.token_hash == hash_token(&first.refresh_token))
            .unwrap();
        assert_eq!(old.status, RecordStatus::Inactive);

        let replay = service
            .rotate_at(&first.access_token, &first.refresh_token, later)
            .await;
        assert_eq!(reason(replay), Some(AuthError::TokenAlreadyRotated));
    }

    #[tokio::test]
    async fn test_new_pair_can_be_rotated_again() {
        let (service, _) = service();
        let first = service.login_and_issue(UserId(42)).await.unwrap();
        let t1 = after_access_expiry();
        let second = service
            .rotate_at(&first.access_token, &first.refresh_token, t1)
            .await
            .unwrap();

        let t2 = t1 + Duration::seconds(ACCESS_LIFETIME + 1);
        let third = service
            .rotate_at(&second.access_token, &second.refresh_token, t2)
            .await
            .unwrap();

        assert_ne!(third.refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn test_live_access_token_is_not_refreshed() {
        let (service, store) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();

        let result = service.rotate(&pair.access_token, &pair.refresh_token).await;

        assert_eq!(reason(result), Some(AuthError::TokenNotExpired));
        assert_eq!(store.records_for_user(UserId(42)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_live_access_token_rejected_even_with_bad_refresh_token() {
        let (service, _) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();

        let result = service.rotate(&pair.access_token, "not-a-real-token").await;

        assert_eq!(reason(result), Some(AuthError::TokenNotExpired));
    }

    #[tokio::test]
    async fn test_malformed_access_token() {
        let (service, _) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();

        let result = service
            .rotate_at("garbage", &pair.refresh_token, after_access_expiry())
            .await;

        assert_eq!(reason(result), Some(AuthError::MalformedToken));
    }

    #[tokio::test]
    async fn test_refresh_token_of_other_user_is_unknown() {
        let (service, _) = service();
        let alice = service.login_and_issue(UserId(42)).await.unwrap();
        let bob = service.login_and_issue(UserId(7)).await.unwrap();

        let result = service
            .rotate_at(&alice.access_token, &bob.refresh_token, after_access_expiry())
            .await;

        assert_eq!(reason(result), Some(AuthError::UnknownRefreshToken));
    }

    #[tokio::test]
    async fn test_expired_refresh_record() {
        let (service, _) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();

        let result = service
            .rotate_at(&pair.access_token, &pair.refresh_token, pair.refresh_expires_at)
            .await;

        assert_eq!(reason(result), Some(AuthError::RefreshTokenExpired));
    }

    #[tokio::test]
    async fn test_failed_rotation_persists_nothing() {
        let (service, store) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();

        let _ = service
            .rotate_at(&pair.access_token, "wrong", after_access_expiry())
            .await;

        let records = store.records_for_user(UserId(42)).await;
        assert_eq!(records.len(), 1);
        assert!(records[0].is_active());
    }

    #[tokio::test]
    async fn test_concurrent_rotations_have_one_winner() {
        let (service, store) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();
        let later = after_access_expiry();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                let access = pair.access_token.clone();
                let refresh = pair.refresh_token.clone();
                tokio::spawn(async move { service.rotate_at(&access, &refresh, later).await })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => {
                    assert_eq!(e.auth_error(), Some(AuthError::TokenAlreadyRotated));
                    conflicts += 1;
                }
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);

        let active = store
            .records_for_user(UserId(42))
            .await
            .into_iter()
            .filter(|r| r.is_active())
            .count();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_revoke_other_sessions_on_rotation() {
        let (service, store) = service_with(RotationPolicy::RevokeOtherSessions);
        let phone = service.login_and_issue(UserId(42)).await.unwrap();
        let laptop = service.login_and_issue(UserId(42)).await.unwrap();

        service
            .rotate_at(&phone.access_token, &phone.refresh_token, after_access_expiry())
            .await
            .unwrap();

        let active = store
            .records_for_user(UserId(42))
            .await
            .into_iter()
            .filter(|r| r.is_active())
            .count();
        assert_eq!(active, 1);

        let result = service
            .rotate_at(&laptop.access_token, &laptop.refresh_token, after_access_expiry())
            .await;
        assert_eq!(reason(result), Some(AuthError::TokenAlreadyRotated));
    }

    #[tokio::test]
    async fn test_logout_retires_session() {
        let (service, _) = service();
        let pair = service.login_and_issue(UserId(42)).await.unwrap();

        service.logout(UserId(42), &pair.refresh_token).await.unwrap();

        let result = service
            .rotate_at(&pair.access_token, &pair.refresh_token, after_access_expiry())
            .await;
        assert_eq!(reason(result), Some(AuthError::TokenAlreadyRotated));

        let again = service.logout(UserId(42), &pair.refresh_token).await;
        assert_eq!(
            again.err().and_then(|e| e.auth_error()),
            Some(AuthError::UnknownRefreshToken)
        );
    }

    #[tokio::test]
    async fn test_logout_all() {
        let (service, _) = service();
        service.login_and_issue(UserId(42)).await.unwrap();
        service.login_and_issue(UserId(42)).await.unwrap();

        assert_eq!(service.logout_all(UserId(42)).await.unwrap(), 2);
    }
}
