use thiserror::Error;

/// CSRF/PKCE state failures. Always terminal: the caller restarts from
/// `initiate`, never retries `complete` with the same state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("authorization state is invalid, expired, or already used")]
    InvalidOrExpired,
}

/// Unsafe or impossible identity resolution during account linking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountLinkError {
    #[error("linking target user no longer exists")]
    UserNotFound,
    #[error("an account with email `{0}` already exists and the identity could not be verified")]
    UnverifiedEmail(String),
}

/// Refresh-token redemption failures. Terminal: the client must
/// re-authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshTokenError {
    #[error("refresh token is invalid")]
    Invalid,
    #[error("refresh token has expired")]
    Expired,
}

/// Signature or claims failures while verifying an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("token is invalid: {0}")]
    Invalid(String),
}
