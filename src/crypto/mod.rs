//! Encryption of brain data at rest
//!
//! Blobs are sealed with AES-256-GCM before they reach the storage
//! provider. Key material lives in [`GuardedKey`] buffers and the two-tier
//! key state (unlocking key / real key) is tracked by [`KeyVault`].

mod keys;
mod vault;

pub use keys::GuardedKey;
pub use vault::{KeyState, KeyVault};
pub(crate) use vault::Unsealed;

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

/// AES-256-GCM encryption key size
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-GCM
pub const TAG_SIZE: usize = 16;

fn cipher(key: &GuardedKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose()))
}

/// Seal `plaintext` under `key`.
///
/// Output layout is `nonce || ciphertext || tag`, so every blob is
/// `NONCE_SIZE + TAG_SIZE` bytes longer than its plaintext.
pub fn encrypt(key: &GuardedKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let sealed = cipher(key)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Crypto("AES-GCM seal failed".to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Open a blob produced by [`encrypt`].
///
/// Fails on a wrong key and on anything that was never sealed.
pub fn decrypt(key: &GuardedKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto("Sealed blob too short".to_string()));
    }
    let (nonce, sealed) = blob.split_at(NONCE_SIZE);
    cipher(key)
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| Error::Crypto("AES-GCM open failed".to_string()))
}

/// Generate a random 32-byte key directly into guarded memory
pub fn generate_key() -> GuardedKey {
    let mut key = GuardedKey::zeroed();
    rand::thread_rng().fill_bytes(key.bytes_mut());
    key
}
