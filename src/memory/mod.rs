//! Short-term memory: ephemeral, unencrypted, TTL-evicted facts

pub mod short_term;

pub use short_term::{MemoryContext, MemoryScope, ShortTermMemories, SHORT_TERM_DURATION};
