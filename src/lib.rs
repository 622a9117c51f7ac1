//! Botbrain - persistent memory for chat robots
//!
//! Botbrain is the brain of a chat-automation robot: a serialized,
//! lock-token based key/value coordinator in front of a pluggable storage
//! provider, with optional encryption at rest and a short-lived
//! conversational memory on the side.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Tasks / plugins                                              │
//! │  ┌──────────────────────┐      ┌───────────────────────────┐ │
//! │  │      DatumStore      │      │       MemoryScope         │ │
//! │  │  - key validation    │      │  - remember / recall      │ │
//! │  │  - namespacing       │      │  - (key, user, channel)   │ │
//! │  │  - JSON marshaling   │      └─────────────┬─────────────┘ │
//! │  └──────────┬───────────┘                    │               │
//! └─────────────┼────────────────────────────────┼───────────────┘
//!               │ request + one-shot reply        │ shared table
//! ┌─────────────▼────────────────────────────────▼───────────────┐
//! │                    Brain coordinator task                     │
//! │  - lock table: New -> Seen -> Available, FIFO waiters         │
//! │  - aging tick (locks + short-term eviction)                   │
//! │  ┌─────────────────────────────────────────────────────────┐ │
//! │  │  KeyVault: AES-256-GCM, unlocking key wraps real key     │ │
//! │  └───────────────────────────┬─────────────────────────────┘ │
//! └──────────────────────────────┼───────────────────────────────┘
//!                                │
//!                     ┌──────────▼──────────┐
//!                     │   StorageProvider   │
//!                     │   (mem, file, ...)  │
//!                     └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`brain`]: brain handle and lock coordinator
//! - [`datum`]: typed, namespaced datum access for tasks
//! - [`memory`]: short-term memories
//! - [`crypto`]: encryption at rest and guarded key memory
//! - [`storage`]: storage provider trait and registry
//! - [`config`]: configuration management

pub mod brain;
pub mod config;
pub mod crypto;
pub mod datum;
pub mod error;
pub mod memory;
pub mod storage;

pub use brain::{Brain, Checkout, LockToken};
pub use config::BotConfig;
pub use datum::{Datum, DatumStore};
pub use error::{Error, Result};
pub use storage::{MemoryBrain, ProviderRegistry, StorageProvider};
