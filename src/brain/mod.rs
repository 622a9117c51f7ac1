//! The robot's brain
//!
//! [`Brain`] is a cheap, cloneable handle onto a single coordinator task
//! that serializes every access to the storage provider. Exclusive
//! checkouts hand out a [`LockToken`]; the datum can only be updated with
//! the current token, and a lock that is not checked in expires after one
//! to two aging ticks.

mod coordinator;
pub mod keys;
mod lock;
mod store;

pub use keys::{
    history_key, validate_key, validate_segment, ENCRYPTION_KEY, HISTORY_PREFIX, PARAMETERS_KEY,
    RESERVED_NAMESPACE, SECRETS_KEY,
};
pub use lock::{Checkout, LockSnapshot, LockToken, MemState};

use crate::config::BrainConfig;
use crate::crypto::{GuardedKey, KeyState, KeyVault};
use crate::datum::DatumStore;
use crate::error::{Error, Result};
use crate::memory::{MemoryScope, ShortTermMemories};
use crate::storage::{ProviderRegistry, StorageProvider};
use coordinator::{BrainOp, Coordinator};
use std::sync::Arc;
use store::BrainStore;
use tokio::sync::{mpsc, oneshot};

/// Handle to the brain coordinator
#[derive(Clone)]
pub struct Brain {
    tx: mpsc::UnboundedSender<BrainOp>,
    vault: Arc<KeyVault>,
    short_term: ShortTermMemories,
}

impl Brain {
    /// Spawn the coordinator over `provider`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(provider: Box<dyn StorageProvider>, config: &BrainConfig) -> Self {
        let vault = Arc::new(KeyVault::new(config.encrypt_brain));
        let short_term = ShortTermMemories::new(config.short_term_ttl());
        let (tx, rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator::new(
            BrainStore::new(provider, vault.clone()),
            short_term.clone(),
            config.tick_interval(),
        );
        tokio::spawn(coordinator.run(rx));

        tracing::info!(encrypted = config.encrypt_brain, "Brain started");

        Self {
            tx,
            vault,
            short_term,
        }
    }

    /// Build the configured provider, start the brain and, when a key is
    /// configured, bootstrap encryption.
    ///
    /// A failed bootstrap is logged, not returned: the brain stays up and
    /// [`Brain::initialize_encryption`] can be retried.
    pub async fn from_config(config: &BrainConfig, registry: &ProviderRegistry) -> Result<Self> {
        let provider = registry.build(&config.provider, &config.provider_config)?;
        let brain = Self::start(provider, config);

        match (&config.encryption_key, config.encrypt_brain) {
            (Some(_), false) => {
                tracing::warn!("Encryption key configured but encrypt_brain is off; ignoring");
            }
            (Some(key), true) => {
                if let Err(e) = brain.initialize_encryption(key.clone()).await {
                    tracing::error!(error = %e, "Brain encryption bootstrap failed");
                }
            }
            (None, true) => {
                tracing::warn!("Brain encryption enabled but no key supplied; brain is locked");
            }
            (None, false) => {}
        }

        Ok(brain)
    }

    async fn request<T>(&self, op: impl FnOnce(oneshot::Sender<T>) -> BrainOp) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(op(reply)).map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Check out a datum by full key.
    ///
    /// An exclusive checkout waits until the datum is free and returns a
    /// lock token; a non-exclusive checkout never waits and returns the
    /// empty token.
    pub async fn checkout(&self, key: &str, exclusive: bool) -> Result<Checkout> {
        check_key(key)?;
        tracing::trace!(key, exclusive, "Checking out datum");
        self.request(|reply| BrainOp::CheckOut {
            key: key.to_string(),
            exclusive,
            reply,
        })
        .await?
    }

    /// Release a lock without writing. Stale or empty tokens are ignored.
    pub fn checkin(&self, key: &str, token: &LockToken) {
        if token.is_none() || check_key(key).is_err() {
            return;
        }
        tracing::trace!(key, token = %token, "Checking in datum");
        let op = BrainOp::CheckIn {
            key: key.to_string(),
            token: token.clone(),
        };
        if self.tx.send(op).is_err() {
            tracing::debug!(key, "Check-in after brain shutdown");
        }
    }

    /// Store a datum and release its lock.
    ///
    /// Fails with [`Error::StaleLock`] if `token` no longer holds the lock.
    /// The empty token is a no-op.
    pub async fn update(&self, key: &str, token: &LockToken, blob: Vec<u8>) -> Result<()> {
        check_key(key)?;
        if token.is_none() {
            return Ok(());
        }
        tracing::trace!(key, token = %token, "Updating datum");
        self.request(|reply| BrainOp::Update {
            key: key.to_string(),
            token: token.clone(),
            blob,
            reply,
        })
        .await?
    }

    /// Supply the unlocking passphrase (32+ bytes) and bring encryption up.
    ///
    /// Creates the real key on first use. A no-op when already initialized;
    /// may be retried after a failure.
    pub async fn initialize_encryption(&self, passphrase: String) -> Result<()> {
        if !self.vault.is_enabled() {
            return Err(Error::Config("Brain encryption is not enabled".to_string()));
        }
        let candidate = GuardedKey::from_passphrase(passphrase)?;
        self.request(|reply| BrainOp::InitEncryption { candidate, reply }).await?
    }

    /// Rewrap the real key under a new unlocking passphrase.
    ///
    /// Stored data keeps its encryption; only the wrapped key is rewritten.
    pub async fn rekey(&self, passphrase: String) -> Result<()> {
        let unlocking = GuardedKey::from_passphrase(passphrase)?;
        self.request(|reply| BrainOp::Rekey { unlocking, reply }).await?
    }

    pub fn encryption_enabled(&self) -> bool {
        self.vault.is_enabled()
    }

    pub async fn encryption_state(&self) -> KeyState {
        self.vault.state().await
    }

    /// Snapshot of the lock record for `key`, `None` if nobody holds it
    pub async fn lock_status(&self, key: &str) -> Result<Option<LockSnapshot>> {
        self.request(|reply| BrainOp::Status {
            key: key.to_string(),
            reply,
        })
        .await
    }

    /// The shared short-term memory table
    pub fn short_term(&self) -> &ShortTermMemories {
        &self.short_term
    }

    /// Short-term memories for one user in one channel
    pub fn memory_scope(&self, user: impl Into<String>, channel: impl Into<String>) -> MemoryScope {
        MemoryScope::new(self.short_term.clone(), user, channel)
    }

    /// Typed datum access confined to `namespace`
    pub fn datum_store(&self, namespace: &str) -> Result<DatumStore> {
        DatumStore::new(self.clone(), namespace)
    }

    /// Stop the coordinator after it drains already queued requests.
    ///
    /// Waiters still blocked on a lock receive [`Error::Shutdown`].
    pub async fn shutdown(&self) {
        match self.request(|reply| BrainOp::Quit { reply }).await {
            Ok(()) => tracing::info!("Brain stopped"),
            Err(_) => tracing::debug!("Brain already stopped"),
        }
    }
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("vault", &self.vault)
            .field("running", &!self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

/// Full-key policy for callers; the wrapped real key is never exposed
fn check_key(key: &str) -> Result<()> {
    validate_key(key)?;
    if key == ENCRYPTION_KEY {
        tracing::error!(key, "Access to the brain key refused");
        return Err(Error::InvalidKey(format!("'{}' is reserved", key)));
    }
    Ok(())
}
