//! Single-use rotation over opaque refresh tokens.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tracing::warn;

use signet_core::{RefreshTokenError, RefreshTokenRecord, digest, random_token};

use crate::storage::{RefreshTokenStore, StoreError};

/// Entropy carried by every raw refresh token.
const TOKEN_ENTROPY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error(transparent)]
    Token(#[from] RefreshTokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a successful rotation: the replacement raw token and the owner
/// it belongs to.
#[derive(Debug, Clone)]
pub struct RotatedToken {
    pub raw_token: String,
    pub user_id: String,
}

/// Issues and rotates opaque refresh tokens. Only digests reach the store;
/// the raw value is returned exactly once per issuance.
pub struct RefreshTokenRotator {
    store: Arc<dyn RefreshTokenStore>,
    ttl: Duration,
}

impl RefreshTokenRotator {
    pub fn new(store: Arc<dyn RefreshTokenStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Generate a fresh opaque token for a user and persist its digest.
    pub async fn issue(&self, user_id: &str) -> Result<String, StoreError> {
        let raw = random_token(TOKEN_ENTROPY_BYTES);
        let record = RefreshTokenRecord {
            token_hash: digest(&raw),
            user_id: user_id.to_string(),
            expires_at: current_epoch_seconds().saturating_add(self.ttl.as_secs()),
            revoked: false,
        };
        self.store.create(record).await?;
        Ok(raw)
    }

    /// Redeem a raw token: revoke it and mint a replacement for the same user
    /// in one operation. The old value is permanently unusable afterwards.
    ///
    /// Failures never consume the token: an expired record is left untouched,
    /// and under concurrent redemption exactly one caller wins the revoke
    /// transition while the rest observe `Invalid`.
    pub async fn rotate(&self, raw_token: &str) -> Result<RotatedToken, RotationError> {
        let token_hash = digest(raw_token);
        let record = match self.store.get(&token_hash).await? {
            Some(record) => record,
            None => return Err(RefreshTokenError::Invalid.into()),
        };

        if record.revoked {
            // A revoked token coming back is a replay: either a stale client
            // or a stolen value. Reported as plain `Invalid`; lineage-wide
            // revocation is intentionally not performed here.
            warn!(user_id = record.user_id.as_str(), "revoked refresh token presented again");
            return Err(RefreshTokenError::Invalid.into());
        }
        if record.expires_at <= current_epoch_seconds() {
            return Err(RefreshTokenError::Expired.into());
        }

        if !self.store.revoke(&token_hash).await? {
            // Lost the race against a concurrent rotation of the same token.
            return Err(RefreshTokenError::Invalid.into());
        }

        let raw_token = self.issue(&record.user_id).await?;
        Ok(RotatedToken {
            raw_token,
            user_id: record.user_id,
        })
    }

    /// Revoke a raw token regardless of its current state. Idempotent:
    /// unknown or already-revoked tokens are a no-op.
    pub async fn revoke(&self, raw_token: &str) -> Result<(), StoreError> {
        self.store.revoke(&digest(raw_token)).await?;
        Ok(())
    }
}

fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRefreshTokenStore;

    fn rotator(store: Arc<MemoryRefreshTokenStore>) -> RefreshTokenRotator {
        RefreshTokenRotator::new(store, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn issue_returns_raw_and_stores_digest_only() {
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let rotator = rotator(store.clone());

        let raw = rotator.issue("user-1").await.expect("issue");
        assert!(store.get(&raw).await.expect("lookup").is_none());
        let record = store
            .get(&digest(&raw))
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(record.user_id, "user-1");
        assert!(!record.revoked);
    }

    #[tokio::test]
    async fn rotate_replaces_token_and_invalidates_old() {
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let rotator = rotator(store);

        let first = rotator.issue("user-1").await.expect("issue");
        let rotated = rotator.rotate(&first).await.expect("rotate");
        assert_eq!(rotated.user_id, "user-1");
        assert_ne!(rotated.raw_token, first);

        // The old value is permanently unusable; the replacement still works.
        let replay = rotator.rotate(&first).await.expect_err("replay");
        assert!(matches!(
            replay,
            RotationError::Token(RefreshTokenError::Invalid)
        ));
        rotator
            .rotate(&rotated.raw_token)
            .await
            .expect("rotate replacement");
    }

    #[tokio::test]
    async fn rotate_unknown_token_is_invalid() {
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let rotator = rotator(store);
        let err = rotator.rotate("no-such-token").await.expect_err("unknown");
        assert!(matches!(
            err,
            RotationError::Token(RefreshTokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn rotate_expired_token_fails_without_consuming() {
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let rotator = rotator(store.clone());

        let raw = "stale-token";
        store
            .create(RefreshTokenRecord {
                token_hash: digest(raw),
                user_id: "user-1".into(),
                expires_at: 1,
                revoked: false,
            })
            .await
            .expect("create");

        let err = rotator.rotate(raw).await.expect_err("expired");
        assert!(matches!(
            err,
            RotationError::Token(RefreshTokenError::Expired)
        ));

        // Expiry is a lookup failure, not a revocation.
        let record = store
            .get(&digest(raw))
            .await
            .expect("lookup")
            .expect("record");
        assert!(!record.revoked);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let rotator = rotator(store);

        let raw = rotator.issue("user-1").await.expect("issue");
        rotator.revoke(&raw).await.expect("revoke");
        rotator.revoke(&raw).await.expect("revoke again");
        rotator.revoke("never-issued").await.expect("revoke absent");

        let err = rotator.rotate(&raw).await.expect_err("revoked");
        assert!(matches!(
            err,
            RotationError::Token(RefreshTokenError::Invalid)
        ));
    }
}
