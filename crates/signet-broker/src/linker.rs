//! Resolution of a verified external identity onto an internal user record.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use signet_core::{
    AccountLinkError, NewUser, OAuthAccountLink, OAuthProfile, TokenSet, User, digest,
};

use crate::{
    password,
    storage::{OAuthAccountStore, StoreError, UserStore},
};

#[derive(Debug, Error)]
pub enum LinkerError {
    #[error(transparent)]
    Link(#[from] AccountLinkError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed: {0}")]
    Password(#[from] password::PasswordError),
}

/// Result of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user: User,
    pub is_new_user: bool,
}

/// Decides how a verified external identity maps onto an internal user.
///
/// The decision order is load-bearing: the existing-link check runs first so
/// repeat sign-ins are idempotent, and auto-linking by email demands
/// verification on both sides before touching an existing account.
#[derive(Clone)]
pub struct AccountLinker {
    users: Arc<dyn UserStore>,
    links: Arc<dyn OAuthAccountStore>,
}

impl AccountLinker {
    pub fn new(users: Arc<dyn UserStore>, links: Arc<dyn OAuthAccountStore>) -> Self {
        Self { users, links }
    }

    pub async fn resolve(
        &self,
        provider: &str,
        profile: &OAuthProfile,
        tokens: &TokenSet,
        linking_user_id: Option<&str>,
    ) -> Result<ResolvedIdentity, LinkerError> {
        // 1. Same identity signing in again: refresh the stored token digests
        //    and hand back the already-linked user.
        if let Some(existing) = self
            .links
            .get_by_provider_id(provider, &profile.provider_user_id)
            .await?
        {
            let refresh_hash = tokens.refresh_token.as_deref().map(digest);
            self.links
                .update_tokens(
                    &existing.id,
                    &digest(&tokens.access_token),
                    refresh_hash.as_deref(),
                    token_expiry(tokens),
                )
                .await?;
            let user = self
                .users
                .get_by_id(&existing.user_id)
                .await?
                .ok_or(AccountLinkError::UserNotFound)?;
            return Ok(ResolvedIdentity {
                user,
                is_new_user: false,
            });
        }

        // 2. An authenticated user is attaching a new provider.
        if let Some(user_id) = linking_user_id {
            let user = self
                .users
                .get_by_id(user_id)
                .await?
                .ok_or(AccountLinkError::UserNotFound)?;
            self.create_link(&user.id, provider, profile, tokens).await?;
            info!(user_id = user.id.as_str(), provider, "linked provider to existing account");
            return Ok(ResolvedIdentity {
                user,
                is_new_user: false,
            });
        }

        // 3. Auto-link by email, only when both sides assert verification.
        //    An unverified claim against an existing account is how takeover
        //    attempts look, so it is a hard failure.
        if let Some(user) = self.users.get_by_email(&profile.email).await? {
            if !(user.email_verified && profile.email_verified) {
                return Err(AccountLinkError::UnverifiedEmail(profile.email.clone()).into());
            }
            self.create_link(&user.id, provider, profile, tokens).await?;
            info!(user_id = user.id.as_str(), provider, "auto-linked provider by verified email");
            return Ok(ResolvedIdentity {
                user,
                is_new_user: false,
            });
        }

        // 4. First sight of this identity: provision a user with an unusable
        //    local password.
        let user = self
            .users
            .create(NewUser {
                email: profile.email.clone(),
                email_verified: profile.email_verified,
                password_hash: password::unusable_password_hash()?,
            })
            .await?;
        self.create_link(&user.id, provider, profile, tokens).await?;
        info!(user_id = user.id.as_str(), provider, "created user from external identity");
        Ok(ResolvedIdentity {
            user,
            is_new_user: true,
        })
    }

    /// Remove the link between a user and a provider.
    pub async fn unlink(&self, user_id: &str, provider: &str) -> Result<bool, StoreError> {
        self.links.delete(user_id, provider).await
    }

    async fn create_link(
        &self,
        user_id: &str,
        provider: &str,
        profile: &OAuthProfile,
        tokens: &TokenSet,
    ) -> Result<(), StoreError> {
        self.links
            .create(OAuthAccountLink {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                provider: provider.to_string(),
                provider_user_id: profile.provider_user_id.clone(),
                access_token_hash: digest(&tokens.access_token),
                refresh_token_hash: tokens.refresh_token.as_deref().map(digest),
                expires_at: token_expiry(tokens),
            })
            .await
    }
}

fn token_expiry(tokens: &TokenSet) -> Option<u64> {
    tokens.expires_in.map(|ttl| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .saturating_add(ttl)
    })
}
