//! Lock tokens and per-key lock records

use crate::error::Result;
use rand::RngCore;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Opaque credential proving exclusive ownership of a datum.
///
/// Minted tokens are 16 lowercase hex characters (8 random bytes). The
/// empty token means "no lock held" and is accepted everywhere as a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// The "no lock held" sentinel
    pub fn none() -> Self {
        Self(String::new())
    }

    pub(crate) fn mint() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// True for the empty sentinel token
    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    /// Token text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LockToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// Lock token; empty for non-exclusive reads
    pub token: LockToken,
    /// Stored blob, `None` if the datum does not exist yet
    pub blob: Option<Vec<u8>>,
}

impl Checkout {
    /// Whether the datum exists in storage
    pub fn exists(&self) -> bool {
        self.blob.is_some()
    }
}

/// Aging state of a lock record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemState {
    /// Lock granted since the last tick
    New,
    /// Lock has survived one tick
    Seen,
    /// Lock expired with nobody waiting; next exclusive checkout takes it
    Available,
}

/// Read-only view of a lock record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshot {
    pub state: MemState,
    pub token: LockToken,
    pub waiters: usize,
}

/// A caller blocked on an exclusive checkout
pub(crate) struct Waiter {
    pub(crate) reply: oneshot::Sender<Result<Checkout>>,
}

/// Per-key lock state, owned by the coordinator
pub(crate) struct LockRecord {
    pub(crate) state: MemState,
    pub(crate) token: LockToken,
    pub(crate) waiters: VecDeque<Waiter>,
}

impl LockRecord {
    pub(crate) fn granted(token: LockToken) -> Self {
        Self {
            state: MemState::New,
            token,
            waiters: VecDeque::with_capacity(2),
        }
    }

    pub(crate) fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            state: self.state,
            token: self.token.clone(),
            waiters: self.waiters.len(),
        }
    }
}
