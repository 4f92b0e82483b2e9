use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// One-way digest applied to every stored secret (state tokens, refresh
/// tokens, provider tokens). Raw values never reach a store.
pub fn digest(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(value.as_bytes()))
}

/// High-entropy opaque token from the OS entropy source, URL-safe encoded.
pub fn random_token(entropy_bytes: usize) -> String {
    let mut entropy = vec![0u8; entropy_bytes];
    OsRng.fill_bytes(&mut entropy);
    URL_SAFE_NO_PAD.encode(entropy)
}
