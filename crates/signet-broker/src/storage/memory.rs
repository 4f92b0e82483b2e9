//! In-memory adapters backing the capability interfaces. Used by the default
//! binary and the test suite; deployments swap in real engines behind the
//! same traits.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use uuid::Uuid;

use signet_core::{NewUser, OAuthAccountLink, RefreshTokenRecord, StateRecord, User};

use super::{OAuthAccountStore, RefreshTokenStore, StateStore, StoreError, UserStore};

struct StoredState {
    record: StateRecord,
    evict_at: Instant,
}

/// TTL-bounded in-memory state store.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<String, StoredState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn set(&self, key: &str, record: StateRecord, ttl: Duration) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("state store lock poisoned");
        map.insert(
            key.to_string(),
            StoredState {
                record,
                evict_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StateRecord>, StoreError> {
        let mut map = self.inner.lock().expect("state store lock poisoned");
        if let Some(stored) = map.get(key) {
            if stored.evict_at <= Instant::now() {
                map.remove(key);
                return Ok(None);
            }
            return Ok(Some(stored.record.clone()));
        }
        Ok(None)
    }

    async fn consume(&self, key: &str) -> Result<Option<StateRecord>, StoreError> {
        let mut map = self.inner.lock().expect("state store lock poisoned");
        let Some(stored) = map.get_mut(key) else {
            return Ok(None);
        };
        if stored.evict_at <= Instant::now() {
            map.remove(key);
            return Ok(None);
        }
        if stored.record.used {
            return Ok(None);
        }
        stored.record.used = true;
        Ok(Some(stored.record.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("state store lock poisoned");
        map.remove(key);
        Ok(())
    }
}

/// In-memory user collection keyed by id, with an email index.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<HashMap<String, StoredUser>>,
}

struct StoredUser {
    user: User,
    #[allow(dead_code)]
    password_hash: String,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user directly, for tests and bootstrap tooling.
    pub fn insert(&self, user: User, password_hash: impl Into<String>) {
        let mut map = self.inner.lock().expect("user store lock poisoned");
        map.insert(
            user.id.clone(),
            StoredUser {
                user,
                password_hash: password_hash.into(),
            },
        );
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let map = self.inner.lock().expect("user store lock poisoned");
        Ok(map.get(id).map(|stored| stored.user.clone()))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let map = self.inner.lock().expect("user store lock poisoned");
        Ok(map
            .values()
            .find(|stored| stored.user.email == email)
            .map(|stored| stored.user.clone()))
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut map = self.inner.lock().expect("user store lock poisoned");
        if map.values().any(|stored| stored.user.email == new_user.email) {
            return Err(StoreError::Duplicate(new_user.email));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: new_user.email,
            email_verified: new_user.email_verified,
            is_active: true,
        };
        map.insert(
            user.id.clone(),
            StoredUser {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );
        Ok(user)
    }

    async fn mark_verified(&self, id: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("user store lock poisoned");
        let stored = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.user.email_verified = true;
        Ok(())
    }

    async fn update_email(&self, id: &str, email: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("user store lock poisoned");
        if map
            .values()
            .any(|stored| stored.user.email == email && stored.user.id != id)
        {
            return Err(StoreError::Duplicate(email.to_string()));
        }
        let stored = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.user.email = email.to_string();
        stored.user.email_verified = false;
        Ok(())
    }
}

/// In-memory link collection keyed by `(provider, provider_user_id)`.
#[derive(Default)]
pub struct MemoryOAuthAccountStore {
    inner: Mutex<Vec<OAuthAccountLink>>,
}

impl MemoryOAuthAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthAccountStore for MemoryOAuthAccountStore {
    async fn get_by_provider_id(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccountLink>, StoreError> {
        let links = self.inner.lock().expect("link store lock poisoned");
        Ok(links
            .iter()
            .find(|link| link.provider == provider && link.provider_user_id == provider_user_id)
            .cloned())
    }

    async fn get_by_user(&self, user_id: &str) -> Result<Vec<OAuthAccountLink>, StoreError> {
        let links = self.inner.lock().expect("link store lock poisoned");
        Ok(links
            .iter()
            .filter(|link| link.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, link: OAuthAccountLink) -> Result<(), StoreError> {
        let mut links = self.inner.lock().expect("link store lock poisoned");
        if links
            .iter()
            .any(|existing| existing.provider == link.provider && existing.provider_user_id == link.provider_user_id)
        {
            return Err(StoreError::Duplicate(format!(
                "{}:{}",
                link.provider, link.provider_user_id
            )));
        }
        links.push(link);
        Ok(())
    }

    async fn update_tokens(
        &self,
        id: &str,
        access_token_hash: &str,
        refresh_token_hash: Option<&str>,
        expires_at: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut links = self.inner.lock().expect("link store lock poisoned");
        let link = links
            .iter_mut()
            .find(|link| link.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        link.access_token_hash = access_token_hash.to_string();
        link.refresh_token_hash = refresh_token_hash.map(String::from);
        link.expires_at = expires_at;
        Ok(())
    }

    async fn delete(&self, user_id: &str, provider: &str) -> Result<bool, StoreError> {
        let mut links = self.inner.lock().expect("link store lock poisoned");
        let before = links.len();
        links.retain(|link| !(link.user_id == user_id && link.provider == provider));
        Ok(links.len() < before)
    }
}

/// In-memory refresh-token records keyed by token hash.
#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    inner: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn create(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("refresh store lock poisoned");
        if map.contains_key(&record.token_hash) {
            return Err(StoreError::Duplicate(record.token_hash));
        }
        map.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn get(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let map = self.inner.lock().expect("refresh store lock poisoned");
        Ok(map.get(token_hash).cloned())
    }

    async fn get_active(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let map = self.inner.lock().expect("refresh store lock poisoned");
        Ok(map
            .get(token_hash)
            .filter(|record| !record.revoked)
            .cloned())
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, StoreError> {
        let mut map = self.inner.lock().expect("refresh store lock poisoned");
        match map.get_mut(token_hash) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(hash: &str) -> StateRecord {
        StateRecord {
            state_hash: hash.to_string(),
            provider: "google".into(),
            redirect_uri: "https://app.example.com/cb".into(),
            code_challenge: None,
            code_challenge_method: None,
            return_to: None,
            linking_user_id: None,
            expires_at: u64::MAX,
            used: false,
        }
    }

    #[tokio::test]
    async fn state_consume_is_single_use() {
        let store = MemoryStateStore::new();
        store
            .set("k1", sample_state("k1"), Duration::from_secs(300))
            .await
            .expect("set");

        let first = store.consume("k1").await.expect("consume");
        assert!(first.is_some());
        let second = store.consume("k1").await.expect("consume again");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn state_get_honors_ttl() {
        let store = MemoryStateStore::new();
        store
            .set("k1", sample_state("k1"), Duration::from_secs(0))
            .await
            .expect("set");
        assert!(store.get("k1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn user_create_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store
            .create(NewUser {
                email: "a@b.com".into(),
                email_verified: true,
                password_hash: "x".into(),
            })
            .await
            .expect("create");
        let err = store
            .create(NewUser {
                email: "a@b.com".into(),
                email_verified: false,
                password_hash: "y".into(),
            })
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_email_resets_verification() {
        let store = MemoryUserStore::new();
        let user = store
            .create(NewUser {
                email: "a@b.com".into(),
                email_verified: true,
                password_hash: "x".into(),
            })
            .await
            .expect("create");
        store
            .update_email(&user.id, "c@d.com")
            .await
            .expect("update");
        let updated = store.get_by_id(&user.id).await.expect("get").expect("user");
        assert_eq!(updated.email, "c@d.com");
        assert!(!updated.email_verified);
    }

    #[tokio::test]
    async fn refresh_revoke_reports_transition_once() {
        let store = MemoryRefreshTokenStore::new();
        store
            .create(RefreshTokenRecord {
                token_hash: "h".into(),
                user_id: "u1".into(),
                expires_at: u64::MAX,
                revoked: false,
            })
            .await
            .expect("create");

        assert!(store.revoke("h").await.expect("revoke"));
        assert!(!store.revoke("h").await.expect("second revoke"));
        assert!(!store.revoke("missing").await.expect("absent revoke"));
        assert!(store.get_active("h").await.expect("get_active").is_none());
        assert!(store.get("h").await.expect("get").is_some());
    }
}
