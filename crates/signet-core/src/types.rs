use serde::{Deserialize, Serialize};

/// Minimal user projection consumed by the credential core. Owned and
/// persisted by the external `UserStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub is_active: bool,
}

/// Fields required to create a user through the `UserStore` capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub email_verified: bool,
    /// Opaque local-password digest; callers hand over an unusable random
    /// digest for accounts created from an external identity.
    pub password_hash: String,
}

/// Verified external identity as reported by a provider's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProfile {
    pub provider_user_id: String,
    pub email: String,
    pub email_verified: bool,
}

/// Token bundle returned by a provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scopes: Vec<String>,
}

/// Pending authorization-flow state, keyed by the digest of the raw state
/// token. Transitions `unused -> used` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub state_hash: String,
    pub provider: String,
    pub redirect_uri: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Allow-listed client URL to redirect to after completion.
    pub return_to: Option<String>,
    /// Present when an already-authenticated user is linking a new provider.
    pub linking_user_id: Option<String>,
    pub expires_at: u64,
    pub used: bool,
}

/// Mapping from an external identity to an internal user. Uniquely keyed by
/// `(provider, provider_user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthAccountLink {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_user_id: String,
    pub access_token_hash: String,
    pub refresh_token_hash: Option<String>,
    pub expires_at: Option<u64>,
}

/// Stored half of an opaque refresh token. The raw value is returned once at
/// issuance and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: u64,
    pub revoked: bool,
}
