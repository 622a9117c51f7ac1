//! Botbrain error types

use thiserror::Error;

/// Botbrain error type
#[derive(Error, Debug)]
pub enum Error {
    /// Key violates the allowed-character policy
    #[error("Invalid datum key: {0}")]
    InvalidKey(String),

    /// Lock token does not match the current holder of the datum
    #[error("Lock expired or not held for datum '{0}'")]
    StaleLock(String),

    /// Structured value could not be marshaled or unmarshaled
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The brain could not complete an operation; details are logged, not returned
    #[error("Brain failure for datum '{key}' during {op}")]
    BrainFailed {
        /// Datum key the operation touched
        key: String,
        /// Operation name (retrieve, store, ...)
        op: &'static str,
    },

    /// Storage provider error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The brain coordinator is no longer running
    #[error("Brain is shut down")]
    Shutdown,
}

impl Error {
    pub(crate) fn brain_failed(key: impl Into<String>, op: &'static str) -> Self {
        Error::BrainFailed {
            key: key.into(),
            op,
        }
    }
}

/// Result type alias for Botbrain operations
pub type Result<T> = std::result::Result<T, Error>;
