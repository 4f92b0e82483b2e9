//! Account recovery: password-reset and email-verification tokens.
//!
//! Requests always report success. Whether the address is known, unknown, or
//! inactive is not observable from the outside; that information hiding is
//! the point, not an error-handling gap.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use signet_core::TokenValidationError;

use crate::{
    storage::{StoreError, UserStore},
    tokens::{IssueError, TokenIssuer, TokenKind},
};

/// Outbound mail capability, injected at construction. The core never touches
/// a concrete transport.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send_password_reset(&self, email: &str, token: &str);
    async fn send_email_verification(&self, email: &str, token: &str);
}

/// Default dispatcher for deployments without outbound mail: records that a
/// message would have been sent. Never logs the token itself.
pub struct TracingDispatcher;

#[async_trait]
impl EmailDispatcher for TracingDispatcher {
    async fn send_password_reset(&self, email: &str, _token: &str) {
        info!(email, "password reset message dispatched");
    }

    async fn send_email_verification(&self, email: &str, _token: &str) {
        info!(email, "verification message dispatched");
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Token(#[from] TokenValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Issue(#[from] IssueError),
}

/// Issues short-lived recovery tokens and applies their effects.
pub struct AccountRecovery {
    users: Arc<dyn UserStore>,
    issuer: Arc<TokenIssuer>,
    email: Arc<dyn EmailDispatcher>,
}

impl AccountRecovery {
    pub fn new(
        users: Arc<dyn UserStore>,
        issuer: Arc<TokenIssuer>,
        email: Arc<dyn EmailDispatcher>,
    ) -> Self {
        Self {
            users,
            issuer,
            email,
        }
    }

    /// Dispatch a password-reset token if the address belongs to an active
    /// account. Returns empty success either way.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), RecoveryError> {
        match self.users.get_by_email(email).await? {
            Some(user) if user.is_active => {
                let token = self.issuer.issue_recovery_token(&user.id)?;
                self.email.send_password_reset(email, &token).await;
            }
            _ => {
                debug!("password reset requested for unknown or inactive address");
            }
        }
        Ok(())
    }

    /// Dispatch an email-verification token to an unverified account.
    /// Returns empty success for unknown and already-verified addresses
    /// alike.
    pub async fn request_email_verification(&self, email: &str) -> Result<(), RecoveryError> {
        match self.users.get_by_email(email).await? {
            Some(user) if user.is_active && !user.email_verified => {
                let token = self.issuer.issue_recovery_token(&user.id)?;
                self.email.send_email_verification(email, &token).await;
            }
            _ => {
                debug!("verification requested for unknown, inactive, or verified address");
            }
        }
        Ok(())
    }

    /// Redeem a verification token and flag the account verified.
    pub async fn confirm_email_verification(&self, token: &str) -> Result<(), RecoveryError> {
        let claims = self.issuer.verify(token, TokenKind::Recovery)?;
        self.users.mark_verified(&claims.sub).await?;
        info!(user_id = claims.sub.as_str(), "email verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Mutex, time::Duration};

    use signet_core::User;
    use uuid::Uuid;

    use crate::storage::MemoryUserStore;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl EmailDispatcher for RecordingDispatcher {
        async fn send_password_reset(&self, email: &str, token: &str) {
            self.sent.lock().expect("sent lock").push((
                "reset".into(),
                email.to_string(),
                token.to_string(),
            ));
        }

        async fn send_email_verification(&self, email: &str, token: &str) {
            self.sent.lock().expect("sent lock").push((
                "verify".into(),
                email.to_string(),
                token.to_string(),
            ));
        }
    }

    fn recovery() -> (
        AccountRecovery,
        Arc<MemoryUserStore>,
        Arc<RecordingDispatcher>,
        Arc<TokenIssuer>,
    ) {
        let users = Arc::new(MemoryUserStore::new());
        let issuer = Arc::new(TokenIssuer::symmetric(
            b"test-secret-test-secret-test-secret".to_vec(),
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        ));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        (
            AccountRecovery::new(users.clone(), issuer.clone(), dispatcher.clone()),
            users,
            dispatcher,
            issuer,
        )
    }

    fn seed_user(users: &MemoryUserStore, email: &str, verified: bool) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            email_verified: verified,
            is_active: true,
        };
        users.insert(user.clone(), "hash");
        user
    }

    #[tokio::test]
    async fn unknown_address_gets_silent_success() {
        let (recovery, _users, dispatcher, _issuer) = recovery();
        recovery
            .request_password_reset("nobody@example.com")
            .await
            .expect("silent success");
        assert!(dispatcher.sent.lock().expect("sent lock").is_empty());
    }

    #[tokio::test]
    async fn known_address_receives_reset_token() {
        let (recovery, users, dispatcher, _issuer) = recovery();
        seed_user(&users, "a@b.com", true);

        recovery
            .request_password_reset("a@b.com")
            .await
            .expect("request");
        let sent = dispatcher.sent.lock().expect("sent lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "reset");
        assert_eq!(sent[0].1, "a@b.com");
    }

    #[tokio::test]
    async fn verification_roundtrip_marks_user_verified() {
        let (recovery, users, dispatcher, _issuer) = recovery();
        let user = seed_user(&users, "a@b.com", false);

        recovery
            .request_email_verification("a@b.com")
            .await
            .expect("request");
        let token = {
            let sent = dispatcher.sent.lock().expect("sent lock");
            sent[0].2.clone()
        };

        recovery
            .confirm_email_verification(&token)
            .await
            .expect("confirm");
        let updated = users.get_by_id(&user.id).await.expect("get").expect("user");
        assert!(updated.email_verified);
    }

    #[tokio::test]
    async fn already_verified_address_is_not_mailed() {
        let (recovery, users, dispatcher, _issuer) = recovery();
        seed_user(&users, "a@b.com", true);

        recovery
            .request_email_verification("a@b.com")
            .await
            .expect("silent success");
        assert!(dispatcher.sent.lock().expect("sent lock").is_empty());
    }

    #[tokio::test]
    async fn access_token_cannot_confirm_verification() {
        let (recovery, users, _dispatcher, issuer) = recovery();
        let user = seed_user(&users, "a@b.com", false);

        let access = issuer.issue_access_token(&user.id).expect("issue");
        let err = recovery
            .confirm_email_verification(&access)
            .await
            .expect_err("wrong kind");
        assert!(matches!(err, RecoveryError::Token(_)));
    }
}
