pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use signet_core::{NewUser, OAuthAccountLink, RefreshTokenRecord, StateRecord, User};

pub use memory::{MemoryOAuthAccountStore, MemoryRefreshTokenStore, MemoryStateStore, MemoryUserStore};

/// Errors arising from storage adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Key-value store with TTL holding pending authorization state.
///
/// `consume` is the single-use consumption primitive: it marks a record used
/// and returns it, and exactly one caller can win that transition per key.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn set(&self, key: &str, record: StateRecord, ttl: Duration) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<StateRecord>, StoreError>;
    /// Atomically transition the record `unused -> used`, returning it only
    /// to the caller that performed the transition.
    async fn consume(&self, key: &str) -> Result<Option<StateRecord>, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Capability interface over the externally owned user collection.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;
    async fn mark_verified(&self, id: &str) -> Result<(), StoreError>;
    async fn update_email(&self, id: &str, email: &str) -> Result<(), StoreError>;
}

/// Capability interface over external-identity links, uniquely keyed by
/// `(provider, provider_user_id)`.
#[async_trait]
pub trait OAuthAccountStore: Send + Sync {
    async fn get_by_provider_id(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccountLink>, StoreError>;
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<OAuthAccountLink>, StoreError>;
    async fn create(&self, link: OAuthAccountLink) -> Result<(), StoreError>;
    async fn update_tokens(
        &self,
        id: &str,
        access_token_hash: &str,
        refresh_token_hash: Option<&str>,
        expires_at: Option<u64>,
    ) -> Result<(), StoreError>;
    /// Remove the link between a user and a provider, reporting whether a
    /// link existed.
    async fn delete(&self, user_id: &str, provider: &str) -> Result<bool, StoreError>;
}

/// Capability interface over stored refresh-token records.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;
    /// Fetch a record regardless of its revocation state.
    async fn get(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;
    /// Fetch a record only while it has not been revoked.
    async fn get_active(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;
    /// Mark a record revoked. Returns `true` only for the call that performed
    /// the `false -> true` transition, so concurrent redeemers can be told
    /// apart.
    async fn revoke(&self, token_hash: &str) -> Result<bool, StoreError>;
}
