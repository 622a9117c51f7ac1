//! Pluggable storage providers
//!
//! A provider is a dumb durable get/put of opaque blobs by string key. It
//! gets no locking, versioning or encryption duties: the brain coordinator
//! is its only caller and provides all of that.

mod memory;

pub use memory::MemoryBrain;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Durable blob storage behind the brain
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store a blob under `key`, replacing any previous value
    async fn store(&self, key: &str, blob: &[u8]) -> Result<()>;

    /// Retrieve the blob stored under `key`, or `None` if it was never stored
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Builds a provider from its provider-specific configuration table
pub type ProviderFactory =
    Arc<dyn Fn(&toml::Table) -> Result<Box<dyn StorageProvider>> + Send + Sync>;

/// Name of the built-in, non-persistent provider
pub const MEMORY_PROVIDER: &str = "mem";

/// Registry of named storage providers
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in `mem` provider
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            MEMORY_PROVIDER.to_string(),
            Arc::new(|_: &toml::Table| -> Result<Box<dyn StorageProvider>> {
                Ok(Box::new(MemoryBrain::new()))
            }),
        );
        registry
    }

    /// Register a provider factory under `name`; duplicate names are rejected
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::Config(format!(
                "Duplicate brain provider name: {}",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Names of all registered providers
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the provider called `name`.
    ///
    /// An empty name falls back to the in-memory provider.
    pub fn build(&self, name: &str, config: &toml::Table) -> Result<Box<dyn StorageProvider>> {
        let name = if name.is_empty() {
            tracing::error!("No brain configured, falling back to 'mem'; no memories will persist");
            MEMORY_PROVIDER
        } else {
            name
        };
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::Config(format!("No provider registered for brain: \"{}\"", name))
        })?;
        factory(config)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
