use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError, ValidationError};

/// The two persistence scopes the overlay can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Lives as long as the owning session.
    Session,
    /// Survives restarts.
    Durable,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Session => "session",
            BackendKind::Durable => "durable",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ValidationError;

    /// Accepts the canonical names plus the browser storage names older data was written with.
    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "session" | "sessionStorage" => Ok(BackendKind::Session),
            "durable" | "local" | "localStorage" => Ok(BackendKind::Durable),
            other => Err(ValidationError::InvalidBackend {
                name: other.to_string(),
            }),
        }
    }
}

/// Raw string key-value primitives the overlay is layered on.
///
/// Each call is expected to be atomic on its own; callers get no
/// cross-call isolation.
pub trait RawBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites any existing entry.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Idempotent.
    fn remove_item(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;

    /// Key at `index` in enumeration order, if any.
    fn key(&self, index: usize) -> Result<Option<String>>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of every key, in enumeration order.
    fn keys(&self) -> Result<Vec<String>> {
        let len = self.len()?;
        let mut keys = Vec::with_capacity(len);
        for index in 0..len {
            if let Some(key) = self.key(index)? {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

/// Explicit mapping from backend name to backend instance.
#[derive(Clone)]
pub struct BackendRegistry {
    session: Arc<dyn RawBackend>,
    durable: Arc<dyn RawBackend>,
}

impl BackendRegistry {
    pub fn new(session: Arc<dyn RawBackend>, durable: Arc<dyn RawBackend>) -> Self {
        Self { session, durable }
    }

    /// Two independent in-memory backends, for tests and ephemeral use.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
        )
    }

    pub fn get(&self, kind: BackendKind) -> &dyn RawBackend {
        match kind {
            BackendKind::Session => self.session.as_ref(),
            BackendKind::Durable => self.durable.as_ref(),
        }
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry").finish_non_exhaustive()
    }
}

/// Insertion-ordered in-memory backend. Clones share the same storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<IndexMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexMap<String, String>>> {
        self.inner
            .lock()
            .map_err(|err| StashError::backend(format!("lock poisoned: {err}")))
    }
}

impl RawBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?.shift_remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .get_index(index)
            .map(|(key, _)| key.clone()))
    }
}
