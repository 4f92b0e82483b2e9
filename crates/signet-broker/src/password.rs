//! Opaque local-password primitive: `hash -> digest`, `verify -> bool`.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

use signet_core::random_token;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Digest a password with per-call salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// Check a candidate against a stored digest. Unparseable digests verify as
/// false rather than erroring, so corrupted records can never authenticate.
pub fn verify_password(stored: &str, candidate: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Digest of a random secret that is immediately discarded. Accounts created
/// from an external identity get one of these so the local-password path can
/// never sign them in.
pub fn unusable_password_hash() -> Result<String, PasswordError> {
    hash_password(&random_token(32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let stored = hash_password("hunter2").expect("hash");
        assert!(verify_password(&stored, "hunter2"));
        assert!(!verify_password(&stored, "hunter3"));
    }

    #[test]
    fn garbage_digest_never_verifies() {
        assert!(!verify_password("not-a-phc-string", "anything"));
    }

    #[test]
    fn unusable_hash_is_well_formed_but_unknown() {
        let stored = unusable_password_hash().expect("hash");
        assert!(stored.starts_with("$argon2"));
        assert!(!verify_password(&stored, ""));
    }
}
