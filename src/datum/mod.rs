//! Typed, namespaced datum access
//!
//! Tasks never build brain keys themselves: a [`DatumStore`] validates the
//! caller's key, prefixes it with the task namespace (and the pipeline's
//! extension, if any) and marshals values as JSON.

use crate::brain::keys::namespaced;
use crate::brain::{validate_segment, Brain, LockToken, RESERVED_NAMESPACE};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A checked-out structured value
#[derive(Debug, Clone, PartialEq)]
pub struct Datum<T> {
    /// Lock token; empty for read-only checkouts
    pub token: LockToken,
    /// Stored value, `None` if the datum does not exist yet
    pub value: Option<T>,
}

impl<T> Datum<T> {
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }
}

/// Datum access scoped to one task namespace
#[derive(Debug, Clone)]
pub struct DatumStore {
    brain: Brain,
    namespace: String,
    extension: Option<String>,
}

impl DatumStore {
    /// Scope datum access to `namespace`.
    ///
    /// The robot's own namespace is refused.
    pub fn new(brain: Brain, namespace: &str) -> Result<Self> {
        validate_segment(namespace)?;
        if namespace == RESERVED_NAMESPACE {
            return Err(Error::InvalidKey(format!(
                "namespace '{}' is reserved",
                namespace
            )));
        }
        Ok(Self {
            brain,
            namespace: namespace.to_string(),
            extension: None,
        })
    }

    /// Further scope keys by a namespace extension (e.g. one repository)
    pub fn with_extension(mut self, extension: &str) -> Result<Self> {
        validate_segment(extension)?;
        self.extension = Some(extension.to_string());
        Ok(self)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Internal brain key for a caller key
    pub fn full_key(&self, key: &str) -> Result<String> {
        validate_segment(key)?;
        Ok(namespaced(&self.namespace, self.extension.as_deref(), key))
    }

    /// Check out and unmarshal a datum.
    ///
    /// With `exclusive`, the datum stays locked until [`DatumStore::update`]
    /// or [`DatumStore::checkin`]. A blob that does not unmarshal into `T`
    /// is checked back in before the error is returned.
    pub async fn checkout<T: DeserializeOwned>(
        &self,
        key: &str,
        exclusive: bool,
    ) -> Result<Datum<T>> {
        let full = self.full_key(key)?;
        let checkout = self.brain.checkout(&full, exclusive).await?;

        let value = match checkout.blob {
            None => None,
            Some(blob) => match serde_json::from_slice(&blob) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!(key = %full, error = %e, "Failed to unmarshal datum");
                    self.brain.checkin(&full, &checkout.token);
                    return Err(Error::Serialization(e));
                }
            },
        };

        Ok(Datum {
            token: checkout.token,
            value,
        })
    }

    /// Marshal `value`, store it and release the lock.
    ///
    /// The empty token is a no-op.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        key: &str,
        token: &LockToken,
        value: &T,
    ) -> Result<()> {
        let full = self.full_key(key)?;
        if token.is_none() {
            return Ok(());
        }
        let blob = serde_json::to_vec(value).map_err(|e| {
            tracing::error!(key = %full, error = %e, "Failed to marshal datum");
            Error::Serialization(e)
        })?;
        self.brain.update(&full, token, blob).await
    }

    /// Release a lock without writing; always safe to call
    pub fn checkin(&self, key: &str, token: &LockToken) {
        if let Ok(full) = self.full_key(key) {
            self.brain.checkin(&full, token);
        }
    }
}
