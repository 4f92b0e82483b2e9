//! Signing-key lifecycle: generation, import, rotation, pruning, and JWKS
//! materialization.
//!
//! The key set is the only long-lived mutable shared state in the process.
//! Writers (`rotate`, `prune`) take the lock briefly; readers clone `Arc`
//! snapshots and never hold the lock across I/O, so a token produced during a
//! rotation always carries a `kid` that verifiers can still resolve.

use std::{
    sync::{Arc, RwLock},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE_NO_PAD};
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::EncodingKey;
use rand::{RngCore, rngs::OsRng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

/// PKCS#8 v1 wrapper for a raw Ed25519 seed, accepted by the JWT encoder.
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04,
    0x20,
];

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid signing key material for {0} (expected base64 of a 32-byte seed)")]
    InvalidKey(&'static str),
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// One retained signing key. The private half never leaves this module; the
/// public half is exposed through [`SigningKeyManager::jwks`].
#[derive(Debug)]
pub struct KeyEntry {
    kid: String,
    created_at: u64,
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl KeyEntry {
    fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let verifying = signing.verifying_key();
        Self {
            kid: derive_kid(&verifying),
            created_at: current_epoch_seconds(),
            signing,
            verifying,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Base64url-encoded public key, the `x` component of the JWK.
    pub fn public_component(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.verifying.as_bytes())
    }

    /// Private key wrapped for the JWT encoder.
    pub(crate) fn encoding_key(&self) -> EncodingKey {
        let mut der = Vec::with_capacity(48);
        der.extend_from_slice(&ED25519_PKCS8_PREFIX);
        der.extend_from_slice(self.signing.as_bytes());
        EncodingKey::from_ed_der(&der)
    }
}

/// `kid` is a stable fingerprint of the public key: the first 8 bytes of its
/// SHA-256, base64url encoded.
fn derive_kid(verifying: &VerifyingKey) -> String {
    let fingerprint = Sha256::digest(verifying.as_bytes());
    URL_SAFE_NO_PAD.encode(&fingerprint[..8])
}

#[derive(Debug)]
struct KeyRing {
    keys: Vec<Arc<KeyEntry>>,
    active: Arc<KeyEntry>,
}

/// Owns the signing-key set and its rotation schedule.
#[derive(Debug)]
pub struct SigningKeyManager {
    ring: RwLock<KeyRing>,
    rotation_interval: Duration,
}

impl SigningKeyManager {
    /// Initialize with a freshly generated keypair as the sole signing key.
    pub fn generate(rotation_interval: Duration) -> Self {
        let entry = Arc::new(KeyEntry::generate());
        info!(kid = entry.kid(), "generated initial signing key");
        Self::with_entry(entry, rotation_interval)
    }

    /// Initialize from a fixed base64-encoded 32-byte seed, imported as the
    /// sole signing key. The `kid` is derived at import time.
    pub fn from_base64_seed(
        seed_b64: &str,
        rotation_interval: Duration,
    ) -> Result<Self, KeyError> {
        let bytes = BASE64_STANDARD
            .decode(seed_b64.as_bytes())
            .map_err(|err| KeyError::Encoding(err.to_string()))?;
        if bytes.len() != 32 {
            return Err(KeyError::InvalidKey("SIGNET_ED25519_SEED_BASE64"));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        let entry = Arc::new(KeyEntry::from_seed(seed));
        info!(kid = entry.kid(), "imported configured signing key");
        Ok(Self::with_entry(entry, rotation_interval))
    }

    fn with_entry(entry: Arc<KeyEntry>, rotation_interval: Duration) -> Self {
        Self {
            ring: RwLock::new(KeyRing {
                keys: vec![entry.clone()],
                active: entry,
            }),
            rotation_interval,
        }
    }

    /// Snapshot of the current signing key. Callers sign against this
    /// snapshot without holding the key-set lock.
    pub fn active_key(&self) -> Arc<KeyEntry> {
        let ring = self.ring.read().expect("key ring lock poisoned");
        ring.active.clone()
    }

    /// Look up a retained key by `kid` for verification. Pruned keys resolve
    /// to `None`, which makes tokens signed by them permanently invalid.
    pub fn verification_key(&self, kid: &str) -> Option<Arc<KeyEntry>> {
        let ring = self.ring.read().expect("key ring lock poisoned");
        ring.keys.iter().find(|entry| entry.kid == kid).cloned()
    }

    /// Generate a new keypair and atomically make it the signing key.
    /// Previous keys are retained for verification only.
    pub fn rotate(&self) -> String {
        let entry = Arc::new(KeyEntry::generate());
        let kid = entry.kid().to_string();
        let mut ring = self.ring.write().expect("key ring lock poisoned");
        ring.keys.push(entry.clone());
        ring.active = entry;
        info!(kid = kid.as_str(), retained = ring.keys.len(), "rotated signing key");
        kid
    }

    /// Discard keys older than twice the rotation interval. The active key is
    /// always retained regardless of age, so this grace window keeps tokens
    /// signed just before a rotation verifiable through at least one full
    /// interval.
    pub fn prune(&self) -> usize {
        let cutoff = current_epoch_seconds().saturating_sub(2 * self.rotation_interval.as_secs());
        let mut ring = self.ring.write().expect("key ring lock poisoned");
        let active_kid = ring.active.kid.clone();
        let before = ring.keys.len();
        ring.keys
            .retain(|entry| entry.kid == active_kid || entry.created_at > cutoff);
        let removed = before - ring.keys.len();
        if removed > 0 {
            info!(removed, retained = ring.keys.len(), "pruned stale signing keys");
        }
        removed
    }

    /// Public material of every retained key, for `/.well-known/jwks.json`.
    /// The JWK type has no private fields, so nothing beyond `kid`/`x` can
    /// leak regardless of how the key set evolves.
    pub fn jwks(&self) -> JwkSet {
        let ring = self.ring.read().expect("key ring lock poisoned");
        let keys = ring
            .keys
            .iter()
            .map(|entry| Jwk {
                kty: "OKP",
                crv: "Ed25519",
                use_: "sig",
                alg: "EdDSA",
                kid: entry.kid.clone(),
                x: entry.public_component(),
            })
            .collect();
        JwkSet { keys }
    }
}

/// Public JSON Web Key. Exactly the fields verifiers need.
#[derive(Debug, Clone, Serialize)]
pub struct Jwk {
    pub kty: &'static str,
    pub crv: &'static str,
    #[serde(rename = "use")]
    pub use_: &'static str,
    pub alg: &'static str,
    pub kid: String,
    pub x: String,
}

/// JWKS document served at `/.well-known/jwks.json`.
#[derive(Debug, Clone, Serialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Periodic rotation trigger. Entirely external to the key-set logic: each
/// tick is a plain `rotate` followed by `prune`.
pub fn spawn_rotation_worker(
    keys: Arc<SigningKeyManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the initial key serves
        // a full interval.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let kid = keys.rotate();
            let pruned = keys.prune();
            if pruned > 0 {
                warn!(kid = kid.as_str(), pruned, "rotation evicted verification keys");
            }
        }
    })
}

fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
