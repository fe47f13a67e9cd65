use std::time::Duration;

use serde_json::Value;
use stash_core::{BackendKind, ValidationError};

/// A write against one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRequest {
    pub key: String,
    pub value: Value,
    pub backend: BackendKind,
    /// Time-to-live in milliseconds; `None` never expires.
    pub ttl_millis: Option<u64>,
    pub encrypt: bool,
    pub secret_key: Option<String>,
}

impl StorageRequest {
    pub fn new(key: impl Into<String>, backend: BackendKind, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            backend,
            ttl_millis: None,
            encrypt: false,
            secret_key: None,
        }
    }

    pub fn ttl_millis(mut self, ttl_millis: u64) -> Self {
        self.ttl_millis = Some(ttl_millis);
        self
    }

    /// Sub-millisecond remainders are truncated; a duration under 1ms fails validation.
    pub fn ttl(self, ttl: Duration) -> Self {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.ttl_millis(millis)
    }

    pub fn encrypted(mut self, secret_key: impl Into<String>) -> Self {
        self.encrypt = true;
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Checks every request invariant. Runs before any backend I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key.is_empty() {
            return Err(ValidationError::MissingKey);
        }
        if let Some(ttl_millis) = self.ttl_millis {
            if ttl_millis == 0 {
                return Err(ValidationError::InvalidTtl { ttl_millis });
            }
        }
        if self.encrypt && self.secret().is_none() {
            return Err(ValidationError::MissingSecretKey);
        }
        Ok(())
    }

    /// The secret, if one is set and non-empty.
    pub(crate) fn secret(&self) -> Option<&str> {
        self.secret_key.as_deref().filter(|secret| !secret.is_empty())
    }
}

/// A read against one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageQuery {
    pub key: String,
    pub backend: BackendKind,
    /// Must be supplied exactly when the entry was written encrypted.
    pub secret_key: Option<String>,
}

impl StorageQuery {
    pub fn new(key: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            key: key.into(),
            backend,
            secret_key: None,
        }
    }

    pub fn secret(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key.is_empty() {
            return Err(ValidationError::MissingKey);
        }
        Ok(())
    }
}
