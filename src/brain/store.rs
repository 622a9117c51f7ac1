//! Encrypted datum I/O against the storage provider
//!
//! Only the coordinator task holds a `BrainStore`, so the provider never
//! sees concurrent calls from the brain.

use super::keys::ENCRYPTION_KEY;
use crate::crypto::{KeyVault, Unsealed};
use crate::error::{Error, Result};
use crate::storage::StorageProvider;
use std::sync::Arc;

pub(crate) struct BrainStore {
    provider: Box<dyn StorageProvider>,
    vault: Arc<KeyVault>,
}

impl BrainStore {
    pub(crate) fn new(provider: Box<dyn StorageProvider>, vault: Arc<KeyVault>) -> Self {
        Self { provider, vault }
    }

    pub(crate) fn vault(&self) -> &KeyVault {
        &self.vault
    }

    /// Retrieve a datum, decrypting it when brain encryption is on.
    ///
    /// A datum that fails to decrypt under the live key predates
    /// encryption: it is returned as-is and written back encrypted.
    pub(crate) async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blob = match self.provider.retrieve(key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::error!(key, error = %e, "Retrieving datum failed");
                return Err(Error::brain_failed(key, "retrieve"));
            }
        };

        if !self.vault.is_enabled() {
            return Ok(Some(blob));
        }

        let bootstrap = key == ENCRYPTION_KEY;
        match self.vault.open(bootstrap, &blob).await {
            Ok(Unsealed::Decrypted(plain)) => Ok(Some(plain)),
            Ok(Unsealed::Legacy) if bootstrap => {
                tracing::error!(key, "Wrapped brain key does not decrypt under the live key");
                Err(Error::brain_failed(key, "decrypt"))
            }
            Ok(Unsealed::Legacy) => {
                tracing::warn!(
                    key,
                    "Decryption failed, assuming unencrypted and converting to encrypted"
                );
                if let Err(e) = self.store(key, &blob).await {
                    tracing::warn!(key, error = %e, "Re-encrypting legacy datum failed");
                }
                Ok(Some(blob))
            }
            Err(e) if bootstrap => {
                tracing::error!(error = %e, "Failed to decrypt the brain key, bad key provided?");
                Err(Error::brain_failed(key, "decrypt"))
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Retrieve called on uninitialized brain");
                Err(Error::brain_failed(key, "decrypt"))
            }
        }
    }

    /// Store a datum, encrypting it first when brain encryption is on
    pub(crate) async fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        if !self.vault.is_enabled() {
            return self.store_raw(key, blob).await;
        }

        let sealed = self
            .vault
            .seal(key == ENCRYPTION_KEY, blob)
            .await
            .map_err(|e| {
                tracing::error!(key, error = %e, "Failed encrypting datum");
                Error::brain_failed(key, "encrypt")
            })?;
        self.store_raw(key, &sealed).await
    }

    /// Store bytes exactly as given
    pub(crate) async fn store_raw(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.provider.store(key, blob).await.map_err(|e| {
            tracing::error!(key, error = %e, "Storing datum failed");
            Error::brain_failed(key, "store")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_key, GuardedKey};
    use crate::storage::MemoryBrain;

    fn store_with(backend: &MemoryBrain, encrypted: bool) -> (BrainStore, Arc<KeyVault>) {
        let vault = Arc::new(KeyVault::new(encrypted));
        let store = BrainStore::new(Box::new(backend.clone()), vault.clone());
        (store, vault)
    }

    async fn unlock(vault: &KeyVault) {
        let candidate =
            GuardedKey::from_passphrase("an operator passphrase of 32+ bytes".to_string()).unwrap();
        vault.begin(candidate).await.unwrap();
        vault.adopt(generate_key()).await;
    }

    #[tokio::test]
    async fn test_plain_passthrough() {
        let backend = MemoryBrain::new();
        let (store, _) = store_with(&backend, false);

        store.store("lists:lunch", b"tacos").await.unwrap();
        assert_eq!(backend.raw("lists:lunch").await, Some(b"tacos".to_vec()));
        assert_eq!(
            store.fetch("lists:lunch").await.unwrap(),
            Some(b"tacos".to_vec())
        );
        assert_eq!(store.fetch("lists:dinner").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_encrypted_round_trip() {
        let backend = MemoryBrain::new();
        let (store, vault) = store_with(&backend, true);
        unlock(&vault).await;

        store.store("lists:lunch", b"tacos").await.unwrap();
        let raw = backend.raw("lists:lunch").await.unwrap();
        assert_ne!(raw, b"tacos".to_vec());

        assert_eq!(
            store.fetch("lists:lunch").await.unwrap(),
            Some(b"tacos".to_vec())
        );
    }

    #[tokio::test]
    async fn test_legacy_plaintext_migrated() {
        let backend = MemoryBrain::new();
        backend.store("lists:lunch", b"old tacos").await.unwrap();

        let (store, vault) = store_with(&backend, true);
        unlock(&vault).await;

        assert_eq!(
            store.fetch("lists:lunch").await.unwrap(),
            Some(b"old tacos".to_vec())
        );
        // Written back encrypted
        assert_ne!(
            backend.raw("lists:lunch").await,
            Some(b"old tacos".to_vec())
        );
        assert_eq!(
            store.fetch("lists:lunch").await.unwrap(),
            Some(b"old tacos".to_vec())
        );
    }

    #[tokio::test]
    async fn test_uninitialized_encrypted_brain_fails() {
        let backend = MemoryBrain::new();
        backend.store("lists:lunch", b"x").await.unwrap();
        let (store, _) = store_with(&backend, true);

        assert!(matches!(
            store.fetch("lists:lunch").await,
            Err(Error::BrainFailed { op: "decrypt", .. })
        ));
        assert!(matches!(
            store.store("lists:lunch", b"y").await,
            Err(Error::BrainFailed { op: "encrypt", .. })
        ));
        // Storage untouched by the failed store
        assert_eq!(backend.raw("lists:lunch").await, Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_datum_needs_no_key() {
        let backend = MemoryBrain::new();
        let (store, _) = store_with(&backend, true);
        assert_eq!(store.fetch("lists:lunch").await.unwrap(), None);
    }
}
