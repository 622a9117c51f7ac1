//! The brain coordinator
//!
//! One task owns the lock table and the storage provider. Callers talk to
//! it only through [`BrainOp`] messages, each carrying a private one-shot
//! reply channel, so exclusive access is serialized without a lock per key.
//!
//! Lock aging runs on a fixed tick: `New -> Seen -> Available`. A `Seen`
//! lock with waiters is handed to the head waiter instead, so a lock lasts
//! between one and two ticks unless released sooner.

use super::keys::ENCRYPTION_KEY;
use super::lock::{Checkout, LockRecord, LockSnapshot, LockToken, MemState, Waiter};
use super::store::BrainStore;
use crate::crypto::{generate_key, GuardedKey};
use crate::error::{Error, Result};
use crate::memory::ShortTermMemories;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

/// Requests accepted by the coordinator
pub(crate) enum BrainOp {
    CheckOut {
        key: String,
        exclusive: bool,
        reply: oneshot::Sender<Result<Checkout>>,
    },
    CheckIn {
        key: String,
        token: LockToken,
    },
    Update {
        key: String,
        token: LockToken,
        blob: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    InitEncryption {
        candidate: GuardedKey,
        reply: oneshot::Sender<Result<()>>,
    },
    Rekey {
        unlocking: GuardedKey,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        key: String,
        reply: oneshot::Sender<Option<LockSnapshot>>,
    },
    Quit {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Coordinator {
    store: BrainStore,
    memories: HashMap<String, LockRecord>,
    short_term: ShortTermMemories,
    tick: Duration,
}

impl Coordinator {
    pub(crate) fn new(store: BrainStore, short_term: ShortTermMemories, tick: Duration) -> Self {
        Self {
            store,
            memories: HashMap::new(),
            short_term,
            tick,
        }
    }

    /// Serve requests until `Quit` arrives or every handle is dropped.
    ///
    /// On quit, requests already queued are still processed; waiters that
    /// can never be served are dropped and observe [`Error::Shutdown`].
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BrainOp>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(tick_ms = self.tick.as_millis() as u64, "Brain coordinator started");

        let mut acks = Vec::new();
        loop {
            tokio::select! {
                op = rx.recv() => match op {
                    Some(BrainOp::Quit { reply }) => {
                        acks.push(reply);
                        break;
                    }
                    Some(op) => self.handle(op).await,
                    None => break,
                },
                _ = ticker.tick() => self.age().await,
            }
        }

        rx.close();
        while let Some(op) = rx.recv().await {
            match op {
                BrainOp::Quit { reply } => acks.push(reply),
                op => self.handle(op).await,
            }
        }

        let abandoned: usize = self.memories.values().map(|m| m.waiters.len()).sum();
        if abandoned > 0 {
            tracing::warn!(abandoned, "Brain exiting with unserved waiters");
        }
        drop(self);

        tracing::debug!("Brain exiting on quit");
        for ack in acks {
            let _ = ack.send(());
        }
    }

    async fn handle(&mut self, op: BrainOp) {
        match op {
            BrainOp::CheckOut {
                key,
                exclusive,
                reply,
            } => self.check_out(key, exclusive, reply).await,
            BrainOp::CheckIn { key, token } => self.check_in(&key, &token).await,
            BrainOp::Update {
                key,
                token,
                blob,
                reply,
            } => self.update(&key, &token, &blob, reply).await,
            BrainOp::InitEncryption { candidate, reply } => {
                let _ = reply.send(self.init_encryption(candidate).await);
            }
            BrainOp::Rekey { unlocking, reply } => {
                let _ = reply.send(self.rekey(unlocking).await);
            }
            BrainOp::Status { key, reply } => {
                let _ = reply.send(self.memories.get(&key).map(LockRecord::snapshot));
            }
            BrainOp::Quit { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn check_out(
        &mut self,
        key: String,
        exclusive: bool,
        reply: oneshot::Sender<Result<Checkout>>,
    ) {
        // Non-exclusive reads never touch the lock table
        if !exclusive {
            let result = self.store.fetch(&key).await.map(|blob| Checkout {
                token: LockToken::none(),
                blob,
            });
            let _ = reply.send(result);
            return;
        }

        match self.memories.get_mut(&key) {
            None => match self.store.fetch(&key).await {
                Ok(blob) => {
                    let token = LockToken::mint();
                    self.memories
                        .insert(key.clone(), LockRecord::granted(token.clone()));
                    if reply.send(Ok(Checkout { token, blob })).is_err() {
                        self.memories.remove(&key);
                    }
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Some(record) if record.state == MemState::Available => {
                match self.store.fetch(&key).await {
                    Ok(blob) => {
                        let token = LockToken::mint();
                        record.token = token.clone();
                        record.state = MemState::New;
                        if reply.send(Ok(Checkout { token, blob })).is_err() {
                            self.memories.remove(&key);
                        }
                    }
                    Err(e) => {
                        self.memories.remove(&key);
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Some(record) => {
                record.waiters.push_back(Waiter { reply });
                tracing::trace!(
                    key = %key,
                    waiters = record.waiters.len(),
                    "Datum locked, queueing exclusive checkout"
                );
            }
        }
    }

    async fn check_in(&mut self, key: &str, token: &LockToken) {
        let Some(record) = self.memories.get_mut(key) else {
            return;
        };
        // Lock expired and somebody else owns it now
        if record.token != *token {
            tracing::trace!(key, token = %token, "Ignoring stale check-in");
            return;
        }
        if !serve_next(&self.store, key, record).await {
            self.memories.remove(key);
        }
    }

    async fn update(
        &mut self,
        key: &str,
        token: &LockToken,
        blob: &[u8],
        reply: oneshot::Sender<Result<()>>,
    ) {
        let record = match self.memories.get_mut(key) {
            Some(record) if record.token == *token => record,
            _ => {
                tracing::debug!(key, token = %token, "Update with stale lock token");
                let _ = reply.send(Err(Error::StaleLock(key.to_string())));
                return;
            }
        };

        let _ = reply.send(self.store.store(key, blob).await);
        if !serve_next(&self.store, key, record).await {
            self.memories.remove(key);
        }
    }

    /// One aging cycle: evict stale short-term memories, then age locks
    async fn age(&mut self) {
        let evicted = self.short_term.sweep(Instant::now()).await;
        if evicted > 0 {
            tracing::trace!(evicted, "Evicted short-term memories");
        }

        for (key, record) in self.memories.iter_mut() {
            match record.state {
                MemState::New => record.state = MemState::Seen,
                MemState::Seen => {
                    if !serve_next(&self.store, key, record).await {
                        record.state = MemState::Available;
                    }
                }
                MemState::Available => {}
            }
        }
    }

    async fn init_encryption(&mut self, candidate: GuardedKey) -> Result<()> {
        let vault = self.store.vault();
        if !vault.begin(candidate).await? {
            tracing::info!("Brain encryption already initialized");
            return Ok(());
        }

        match self.bootstrap_key().await {
            Ok(created) => {
                tracing::info!(created, "Brain encryption initialized");
                Ok(())
            }
            Err(e) => {
                self.store.vault().fail().await;
                tracing::error!(error = %e, "Failed to initialize brain encryption");
                Err(e)
            }
        }
    }

    /// Unwrap the stored real key, or generate and wrap a new one.
    /// Returns whether a new real key was created.
    async fn bootstrap_key(&mut self) -> Result<bool> {
        match self.store.fetch(ENCRYPTION_KEY).await? {
            Some(mut unwrapped) => {
                let real = GuardedKey::from_wiped(&mut unwrapped)?;
                self.store.vault().adopt(real).await;
                Ok(false)
            }
            None => {
                let real = generate_key();
                self.store.store(ENCRYPTION_KEY, real.expose()).await?;
                self.store.vault().adopt(real).await;
                Ok(true)
            }
        }
    }

    /// Rewrap the live real key under a new unlocking key.
    /// Stored data is not re-encrypted; the real key does not change.
    async fn rekey(&mut self, unlocking: GuardedKey) -> Result<()> {
        let wrapped = self.store.vault().wrap_real_key(&unlocking).await?;
        self.store.store_raw(ENCRYPTION_KEY, &wrapped).await?;
        tracing::info!("Brain key rewrapped under new unlocking key");
        Ok(())
    }
}

/// Hand the lock to the first waiter still listening.
///
/// Returns false when no waiter could be served; the caller then releases
/// or expires the record.
async fn serve_next(store: &BrainStore, key: &str, record: &mut LockRecord) -> bool {
    while let Some(Waiter { reply }) = record.waiters.pop_front() {
        if reply.is_closed() {
            tracing::trace!(key, "Skipping departed waiter");
            continue;
        }
        match store.fetch(key).await {
            Ok(blob) => {
                let token = LockToken::mint();
                if reply
                    .send(Ok(Checkout {
                        token: token.clone(),
                        blob,
                    }))
                    .is_ok()
                {
                    tracing::trace!(key, token = %token, "Lock handed to waiter");
                    record.token = token;
                    record.state = MemState::New;
                    return true;
                }
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }
    false
}
