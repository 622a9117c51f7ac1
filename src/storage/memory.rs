//! In-memory storage provider
//!
//! Keeps blobs in a `tokio::sync::RwLock`-guarded map. Nothing persists
//! across restarts; this is the fallback brain and the test backend.

use super::StorageProvider;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Non-persistent brain
#[derive(Clone)]
pub struct MemoryBrain {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBrain {
    /// Create a new empty memory brain
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Check if nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Raw stored bytes, bypassing the brain (ciphertext when encrypted)
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(key).cloned()
    }
}

impl Default for MemoryBrain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StorageProvider for MemoryBrain {
    async fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }
}
