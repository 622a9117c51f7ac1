//! Guarded key memory
//!
//! Key bytes live in a heap buffer that never moves, is zeroized on drop
//! and, with the `hardening` feature on Linux, is locked into RAM so it
//! cannot be written to swap.

use super::KEY_SIZE;
use crate::error::{Error, Result};
use zeroize::Zeroize;

/// A 32-byte symmetric key held in guarded memory.
///
/// Not `Clone`: every copy of key material is another thing to wipe.
pub struct GuardedKey {
    bytes: Box<[u8; KEY_SIZE]>,
}

impl GuardedKey {
    /// Allocate an all-zero guarded buffer
    pub(crate) fn zeroed() -> Self {
        let bytes = Box::new([0u8; KEY_SIZE]);
        lock_pages(bytes.as_ptr(), KEY_SIZE);
        Self { bytes }
    }

    /// Build a candidate key from an operator passphrase.
    ///
    /// The passphrase must be at least 32 bytes; its first 32 bytes become
    /// the key. The passphrase itself is wiped whether or not it is accepted.
    pub fn from_passphrase(mut passphrase: String) -> Result<Self> {
        if passphrase.len() < KEY_SIZE {
            passphrase.zeroize();
            return Err(Error::Crypto(format!(
                "Brain key must be at least {} bytes",
                KEY_SIZE
            )));
        }
        let mut key = Self::zeroed();
        key.bytes.copy_from_slice(&passphrase.as_bytes()[..KEY_SIZE]);
        passphrase.zeroize();
        Ok(key)
    }

    /// Move exactly 32 bytes into guarded memory, wiping the source.
    pub fn from_wiped(source: &mut [u8]) -> Result<Self> {
        if source.len() != KEY_SIZE {
            source.zeroize();
            return Err(Error::Crypto(format!(
                "Key material must be exactly {} bytes, got {}",
                KEY_SIZE,
                source.len()
            )));
        }
        let mut key = Self::zeroed();
        key.bytes.copy_from_slice(source);
        source.zeroize();
        Ok(key)
    }

    /// Borrow the raw key bytes (for cipher construction only)
    pub fn expose(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8; KEY_SIZE] {
        &mut self.bytes
    }
}

impl Drop for GuardedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
        unlock_pages(self.bytes.as_ptr(), KEY_SIZE);
    }
}

impl std::fmt::Debug for GuardedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GuardedKey([REDACTED])")
    }
}

#[cfg(all(feature = "hardening", target_os = "linux"))]
fn lock_pages(ptr: *const u8, len: usize) {
    // SAFETY: ptr/len describe a live heap allocation owned by the caller.
    let rc = unsafe { libc::mlock(ptr as *const libc::c_void, len) };
    if rc != 0 {
        tracing::warn!("mlock failed for key buffer; key pages may be swapped");
    }
}

#[cfg(all(feature = "hardening", target_os = "linux"))]
fn unlock_pages(ptr: *const u8, len: usize) {
    // SAFETY: same allocation that was passed to lock_pages.
    unsafe {
        libc::munlock(ptr as *const libc::c_void, len);
    }
}

#[cfg(not(all(feature = "hardening", target_os = "linux")))]
fn lock_pages(_ptr: *const u8, _len: usize) {}

#[cfg(not(all(feature = "hardening", target_os = "linux")))]
fn unlock_pages(_ptr: *const u8, _len: usize) {}
