//! Short-term memories
//!
//! Transient, never-persisted facts scoped by `(key, user, channel)`,
//! mostly what "it" currently refers to. Entries are evicted by the brain
//! coordinator's aging tick once older than the configured TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default lifetime of a short-term memory
pub const SHORT_TERM_DURATION: Duration = Duration::from_secs(7 * 60);

/// Prefix for context memories ("it" resolution)
pub const CONTEXT_PREFIX: &str = "context:";

/// Scope of a short-term memory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryContext {
    pub key: String,
    pub user: String,
    pub channel: String,
}

#[derive(Debug, Clone)]
struct ShortTermMemory {
    memory: String,
    timestamp: Instant,
}

/// Shared short-term memory table
#[derive(Clone)]
pub struct ShortTermMemories {
    entries: Arc<RwLock<HashMap<MemoryContext, ShortTermMemory>>>,
    ttl: Duration,
}

impl ShortTermMemories {
    /// Create an empty table whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value`, overwriting any previous memory and restarting its clock
    pub async fn remember(&self, context: MemoryContext, value: impl Into<String>) {
        let memory = ShortTermMemory {
            memory: value.into(),
            timestamp: Instant::now(),
        };
        tracing::trace!(
            key = %context.key,
            value = %memory.memory,
            "SHORTMEM: Storing short-term memory"
        );
        self.entries.write().await.insert(context, memory);
    }

    /// Recall a memory, or the empty string if there is none.
    ///
    /// Freshness is not rechecked here; only the sweep removes old entries.
    pub async fn recall(&self, context: &MemoryContext) -> String {
        let memory = self
            .entries
            .read()
            .await
            .get(context)
            .map(|m| m.memory.clone())
            .unwrap_or_default();
        tracing::trace!(
            key = %context.key,
            value = %memory,
            "SHORTMEM: Recalling short-term memory"
        );
        memory
    }

    /// Delete entries older than the TTL, returning how many were removed
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, m| now.saturating_duration_since(m.timestamp) <= ttl);
        before - entries.len()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if there are no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ShortTermMemories {
    fn default() -> Self {
        Self::new(SHORT_TERM_DURATION)
    }
}

/// Short-term memories as seen by one user in one channel.
///
/// Not scoped by task: facts remembered by one plugin are visible to
/// every other plugin talking to the same user in the same channel.
#[derive(Clone)]
pub struct MemoryScope {
    memories: ShortTermMemories,
    user: String,
    channel: String,
}

impl MemoryScope {
    pub fn new(
        memories: ShortTermMemories,
        user: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            memories,
            user: user.into(),
            channel: channel.into(),
        }
    }

    fn context(&self, key: &str) -> MemoryContext {
        MemoryContext {
            key: key.to_string(),
            user: self.user.clone(),
            channel: self.channel.clone(),
        }
    }

    /// Remember a fact for this user and channel
    pub async fn remember(&self, key: &str, value: impl Into<String>) {
        self.memories.remember(self.context(key), value).await;
    }

    /// Remember what "it" means for a kind of thing, e.g.
    /// `remember_context("server", "web1.my.dom")`
    pub async fn remember_context(&self, context: &str, value: impl Into<String>) {
        self.remember(&format!("{}{}", CONTEXT_PREFIX, context), value)
            .await;
    }

    /// Recall a fact, or the empty string
    pub async fn recall(&self, key: &str) -> String {
        self.memories.recall(&self.context(key)).await
    }

    /// Recall what "it" means for a kind of thing
    pub async fn recall_context(&self, context: &str) -> String {
        self.recall(&format!("{}{}", CONTEXT_PREFIX, context)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(key: &str, user: &str, channel: &str) -> MemoryContext {
        MemoryContext {
            key: key.to_string(),
            user: user.to_string(),
            channel: channel.to_string(),
        }
    }

    #[tokio::test]
    async fn test_remember_and_recall() {
        let memories = ShortTermMemories::default();
        memories.remember(ctx("it", "alice", "general"), "lunch").await;

        assert_eq!(memories.recall(&ctx("it", "alice", "general")).await, "lunch");
    }

    #[tokio::test]
    async fn test_scoped_by_user_and_channel() {
        let memories = ShortTermMemories::default();
        memories.remember(ctx("it", "alice", "general"), "lunch").await;

        assert_eq!(memories.recall(&ctx("it", "bob", "general")).await, "");
        assert_eq!(memories.recall(&ctx("it", "alice", "random")).await, "");
        assert_eq!(memories.recall(&ctx("that", "alice", "general")).await, "");
    }

    #[tokio::test]
    async fn test_remember_overwrites() {
        let memories = ShortTermMemories::default();
        memories.remember(ctx("it", "alice", "general"), "lunch").await;
        memories.remember(ctx("it", "alice", "general"), "dinner").await;

        assert_eq!(memories.len().await, 1);
        assert_eq!(memories.recall(&ctx("it", "alice", "general")).await, "dinner");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_expired() {
        let memories = ShortTermMemories::default();
        memories.remember(ctx("old", "alice", "general"), "a").await;

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        memories.remember(ctx("young", "alice", "general"), "b").await;

        tokio::time::advance(Duration::from_secs(2 * 60) + Duration::from_secs(1)).await;
        let removed = memories.sweep(Instant::now()).await;

        assert_eq!(removed, 1);
        assert_eq!(memories.recall(&ctx("old", "alice", "general")).await, "");
        assert_eq!(memories.recall(&ctx("young", "alice", "general")).await, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recall_does_not_check_age() {
        let memories = ShortTermMemories::default();
        memories.remember(ctx("it", "alice", "general"), "lunch").await;

        // Past the TTL but not yet swept
        tokio::time::advance(SHORT_TERM_DURATION + Duration::from_secs(30)).await;
        assert_eq!(memories.recall(&ctx("it", "alice", "general")).await, "lunch");

        memories.sweep(Instant::now()).await;
        assert_eq!(memories.recall(&ctx("it", "alice", "general")).await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remember_refreshes_timestamp() {
        let memories = ShortTermMemories::default();
        memories.remember(ctx("it", "alice", "general"), "lunch").await;
        tokio::time::advance(Duration::from_secs(6 * 60)).await;
        memories.remember(ctx("it", "alice", "general"), "lunch").await;
        tokio::time::advance(Duration::from_secs(6 * 60)).await;

        assert_eq!(memories.sweep(Instant::now()).await, 0);
    }

    #[tokio::test]
    async fn test_scope_context_helpers() {
        let memories = ShortTermMemories::default();
        let scope = MemoryScope::new(memories.clone(), "alice", "ops");

        scope.remember_context("server", "web1.my.dom").await;
        assert_eq!(scope.recall_context("server").await, "web1.my.dom");
        assert_eq!(scope.recall("context:server").await, "web1.my.dom");

        let other = MemoryScope::new(memories, "bob", "ops");
        assert_eq!(other.recall_context("server").await, "");
    }
}
