//! Two-tier brain key state
//!
//! The operator supplies an *unlocking* key. It only ever encrypts one
//! datum: the randomly generated *real* key, stored wrapped under the
//! well-known bootstrap key. Every other datum is sealed with the real
//! key, so the unlocking key can change without touching stored history.

use super::{decrypt, encrypt, GuardedKey};
use crate::error::{Error, Result};
use tokio::sync::RwLock;

/// Brain key lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// No key supplied yet
    Uninitialized,
    /// Candidate unlocking key loaded, bootstrap key lookup in progress
    Initializing,
    /// Real key is live
    Initialized,
    /// Bootstrap failed (bad passphrase or storage unavailable); retry allowed
    Failed,
}

/// Outcome of opening a stored blob
#[derive(Debug)]
pub(crate) enum Unsealed {
    /// Blob decrypted under the active key
    Decrypted(Vec<u8>),
    /// Blob did not decrypt; it predates encryption and is plaintext
    Legacy,
}

struct VaultInner {
    state: KeyState,
    /// Candidate unlocking key while initializing, real key once initialized
    key: Option<GuardedKey>,
}

/// Process-wide encryption key holder.
///
/// Guarded by its own lock, separate from the coordinator queue, since
/// initialization can race with early encrypted operations at startup.
pub struct KeyVault {
    enabled: bool,
    inner: RwLock<VaultInner>,
}

impl KeyVault {
    /// Create a vault; `enabled` is fixed for the life of the process
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: RwLock::new(VaultInner {
                state: KeyState::Uninitialized,
                key: None,
            }),
        }
    }

    /// Whether brain encryption was turned on at startup
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current key state
    pub async fn state(&self) -> KeyState {
        self.inner.read().await.state
    }

    /// Load a candidate unlocking key and enter `Initializing`.
    ///
    /// Returns `Ok(false)` when the vault is already initialized (nothing to do).
    pub(crate) async fn begin(&self, candidate: GuardedKey) -> Result<bool> {
        if !self.enabled {
            return Err(Error::Config("Brain encryption is not enabled".to_string()));
        }
        let mut inner = self.inner.write().await;
        match inner.state {
            KeyState::Initialized => Ok(false),
            KeyState::Initializing => Err(Error::Crypto(
                "Brain key initialization already in progress".to_string(),
            )),
            KeyState::Uninitialized | KeyState::Failed => {
                inner.key = Some(candidate);
                inner.state = KeyState::Initializing;
                Ok(true)
            }
        }
    }

    /// Replace the candidate with the real key and go live
    pub(crate) async fn adopt(&self, real: GuardedKey) {
        let mut inner = self.inner.write().await;
        inner.key = Some(real);
        inner.state = KeyState::Initialized;
    }

    /// Abandon initialization, wiping the candidate key
    pub(crate) async fn fail(&self) {
        let mut inner = self.inner.write().await;
        inner.key = None;
        inner.state = KeyState::Failed;
    }

    /// Encrypt a blob for storage.
    ///
    /// While initializing only the bootstrap datum may be sealed (under
    /// the candidate key).
    pub(crate) async fn seal(&self, bootstrap: bool, plaintext: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        match (inner.state, inner.key.as_ref()) {
            (KeyState::Initialized, Some(key)) => encrypt(key, plaintext),
            (KeyState::Initializing, Some(key)) if bootstrap => encrypt(key, plaintext),
            (state, _) => Err(Error::Crypto(format!(
                "Brain key not available for store (state: {:?})",
                state
            ))),
        }
    }

    /// Decrypt a stored blob.
    ///
    /// Bootstrap decrypt failures are hard errors (wrong passphrase); any
    /// other datum that fails to decrypt is reported as [`Unsealed::Legacy`].
    pub(crate) async fn open(&self, bootstrap: bool, blob: &[u8]) -> Result<Unsealed> {
        let inner = self.inner.read().await;
        match (inner.state, inner.key.as_ref()) {
            (KeyState::Initializing, Some(key)) if bootstrap => {
                decrypt(key, blob).map(Unsealed::Decrypted)
            }
            (KeyState::Initialized, Some(key)) => match decrypt(key, blob) {
                Ok(plain) => Ok(Unsealed::Decrypted(plain)),
                Err(_) => Ok(Unsealed::Legacy),
            },
            (state, _) => Err(Error::Crypto(format!(
                "Brain key not available for retrieve (state: {:?})",
                state
            ))),
        }
    }

    /// Wrap the live real key under a new unlocking key
    pub(crate) async fn wrap_real_key(&self, unlocking: &GuardedKey) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        match (inner.state, inner.key.as_ref()) {
            (KeyState::Initialized, Some(real)) => encrypt(unlocking, real.expose()),
            (state, _) => Err(Error::Crypto(format!(
                "Cannot rekey brain in state {:?}",
                state
            ))),
        }
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
