//! Issuance and verification of the broker's own access, refresh, and
//! recovery tokens.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    errors::ErrorKind as JwtErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use signet_core::TokenValidationError;

use crate::{
    keys::SigningKeyManager,
    refresh::RefreshTokenRotator,
    storage::StoreError,
};

/// Lifetime of account-recovery tokens (password reset, email verification).
const RECOVERY_TTL: Duration = Duration::from_secs(30 * 60);

/// Token type discriminator. A token of one kind is never accepted where
/// another is required; every verification call site names the kind it
/// expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Recovery,
}

/// Claims embedded in every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

enum SignerMode {
    /// HS256 over a shared secret, for single-service deployments.
    Symmetric { secret: Vec<u8> },
    /// EdDSA against the managed key set; tokens carry the signing `kid`.
    Asymmetric { keys: Arc<SigningKeyManager> },
}

/// Builds and validates the broker's signed tokens.
pub struct TokenIssuer {
    mode: SignerMode,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn symmetric(secret: Vec<u8>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            mode: SignerMode::Symmetric { secret },
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn asymmetric(
        keys: Arc<SigningKeyManager>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            mode: SignerMode::Asymmetric { keys },
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn issue_access_token(&self, user_id: &str) -> Result<String, IssueError> {
        self.issue_at(user_id, TokenKind::Access, self.access_ttl, current_epoch_seconds())
    }

    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String, IssueError> {
        self.issue_at(user_id, TokenKind::Refresh, self.refresh_ttl, current_epoch_seconds())
    }

    pub fn issue_recovery_token(&self, user_id: &str) -> Result<String, IssueError> {
        self.issue_at(user_id, TokenKind::Recovery, RECOVERY_TTL, current_epoch_seconds())
    }

    fn issue_at(
        &self,
        user_id: &str,
        kind: TokenKind,
        ttl: Duration,
        now: u64,
    ) -> Result<String, IssueError> {
        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
            kind,
        };

        match &self.mode {
            SignerMode::Symmetric { secret } => {
                let header = Header::new(Algorithm::HS256);
                Ok(encode(&header, &claims, &EncodingKey::from_secret(secret))?)
            }
            SignerMode::Asymmetric { keys } => {
                let key = keys.active_key();
                let mut header = Header::new(Algorithm::EdDSA);
                header.kid = Some(key.kid().to_string());
                Ok(encode(&header, &claims, &key.encoding_key())?)
            }
        }
    }

    /// Verify signature and claims, returning the claims only on full
    /// success. There is no lenient mode: expiry, required claims, and the
    /// `type` discriminator are all enforced.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<Claims, TokenValidationError> {
        let header = decode_header(token).map_err(map_jwt_error)?;

        let (decoding_key, algorithm) = match &self.mode {
            SignerMode::Symmetric { secret } => {
                if header.alg != Algorithm::HS256 {
                    return Err(TokenValidationError::Malformed(format!(
                        "unexpected algorithm {:?}",
                        header.alg
                    )));
                }
                (DecodingKey::from_secret(secret), Algorithm::HS256)
            }
            SignerMode::Asymmetric { keys } => {
                if header.alg != Algorithm::EdDSA {
                    return Err(TokenValidationError::Malformed(format!(
                        "unexpected algorithm {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .ok_or_else(|| TokenValidationError::Malformed("missing kid".to_string()))?;
                let entry = keys.verification_key(&kid).ok_or_else(|| {
                    TokenValidationError::Invalid(format!("unknown signing key `{kid}`"))
                })?;
                let decoding_key = DecodingKey::from_ed_components(&entry.public_component())
                    .map_err(|err| TokenValidationError::Invalid(err.to_string()))?;
                (decoding_key, Algorithm::EdDSA)
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(map_jwt_error)?;

        if data.claims.kind != expected {
            return Err(TokenValidationError::Malformed(format!(
                "expected {expected:?} token, got {:?}",
                data.claims.kind
            )));
        }
        if data.claims.jti.is_empty() {
            return Err(TokenValidationError::Malformed("empty jti".to_string()));
        }

        Ok(data.claims)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenValidationError {
    match err.kind() {
        JwtErrorKind::ExpiredSignature => TokenValidationError::Expired,
        JwtErrorKind::MissingRequiredClaim(claim) => {
            TokenValidationError::Malformed(format!("missing claim `{claim}`"))
        }
        JwtErrorKind::InvalidToken | JwtErrorKind::Base64(_) | JwtErrorKind::Json(_) => {
            TokenValidationError::Malformed(err.to_string())
        }
        JwtErrorKind::InvalidSignature => {
            TokenValidationError::Invalid("signature mismatch".to_string())
        }
        other => TokenValidationError::Invalid(format!("{other:?}")),
    }
}

/// Bearer credential pair returned by callback and refresh endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, Error)]
pub enum PairError {
    #[error(transparent)]
    Issue(#[from] IssueError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issue the standard credential pair for a user: a signed access token and
/// an opaque rotating refresh token.
pub async fn issue_token_pair(
    issuer: &TokenIssuer,
    rotator: &RefreshTokenRotator,
    user_id: &str,
) -> Result<TokenPair, PairError> {
    let access_token = issuer.issue_access_token(user_id)?;
    let refresh_token = rotator.issue(user_id).await?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "bearer",
        expires_in: issuer.access_ttl().as_secs(),
    })
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

    fn symmetric_issuer() -> TokenIssuer {
        TokenIssuer::symmetric(
            b"test-secret-test-secret-test-secret".to_vec(),
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        )
    }

    fn asymmetric_issuer() -> (TokenIssuer, Arc<SigningKeyManager>) {
        let keys = Arc::new(SigningKeyManager::generate(Duration::from_secs(3600)));
        let issuer = TokenIssuer::asymmetric(
            keys.clone(),
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        );
        (issuer, keys)
    }

    #[test]
    fn symmetric_roundtrip() {
        let issuer = symmetric_issuer();
        let token = issuer.issue_access_token("user-1").expect("issue");
        let claims = issuer.verify(&token, TokenKind::Access).expect("verify");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn asymmetric_roundtrip_carries_kid() {
        let (issuer, keys) = asymmetric_issuer();
        let token = issuer.issue_access_token("user-1").expect("issue");

        let header = decode_header(&token).expect("header");
        assert_eq!(header.kid.as_deref(), Some(keys.active_key().kid()));

        let claims = issuer.verify(&token, TokenKind::Access).expect("verify");
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn refresh_token_rejected_where_access_expected() {
        let issuer = symmetric_issuer();
        let token = issuer.issue_refresh_token("user-1").expect("issue");
        let err = issuer.verify(&token, TokenKind::Access).expect_err("type check");
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn access_token_rejected_where_refresh_expected() {
        let issuer = symmetric_issuer();
        let token = issuer.issue_access_token("user-1").expect("issue");
        let err = issuer.verify(&token, TokenKind::Refresh).expect_err("type check");
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let issuer = symmetric_issuer();
        let token = issuer
            .issue_at(
                "user-1",
                TokenKind::Access,
                Duration::from_secs(60),
                current_epoch_seconds() - 3600,
            )
            .expect("issue");
        let err = issuer.verify(&token, TokenKind::Access).expect_err("expired");
        assert_eq!(err, TokenValidationError::Expired);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let issuer = symmetric_issuer();
        let mut token = issuer.issue_access_token("user-1").expect("issue");
        token.pop();
        token.push('A');
        assert!(issuer.verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn token_survives_rotation_until_prune() {
        let keys = Arc::new(SigningKeyManager::generate(Duration::from_secs(0)));
        let issuer = TokenIssuer::asymmetric(
            keys.clone(),
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        );

        let token = issuer.issue_access_token("user-1").expect("issue");
        keys.rotate();
        // The previous key is retained, so the old token still verifies.
        issuer
            .verify(&token, TokenKind::Access)
            .expect("verify after rotation");

        // Zero rotation interval: prune discards every non-active key.
        keys.prune();
        let err = issuer
            .verify(&token, TokenKind::Access)
            .expect_err("pruned key");
        assert!(matches!(err, TokenValidationError::Invalid(_)));
    }

    #[test]
    fn symmetric_issuer_rejects_asymmetric_token() {
        let (asymmetric, _keys) = asymmetric_issuer();
        let symmetric = symmetric_issuer();
        let token = asymmetric.issue_access_token("user-1").expect("issue");
        let err = symmetric
            .verify(&token, TokenKind::Access)
            .expect_err("algorithm mismatch");
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn recovery_token_is_its_own_kind() {
        let issuer = symmetric_issuer();
        let token = issuer.issue_recovery_token("user-1").expect("issue");
        issuer.verify(&token, TokenKind::Recovery).expect("verify");
        assert!(issuer.verify(&token, TokenKind::Access).is_err());
    }
}
