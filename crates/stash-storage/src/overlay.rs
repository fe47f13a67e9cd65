use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stash_core::{
    batch::run_batch, BackendKind, BackendRegistry, BatchOptions, BatchReport, Cipher, Clock,
    Diagnostic, DiagnosticKind, DiagnosticSink, Envelope, RawBackend, Result, SystemClock,
    TracingSink,
};
use tracing::{debug, instrument};

use crate::{
    aes::AesGcmCipher,
    request::{StorageQuery, StorageRequest},
};

/// Result of reading one key before diagnostics are collapsed away.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    /// Missing, or expired and now evicted.
    Absent,
    /// Present but undecryptable or unparseable.
    Corrupt(Diagnostic),
}

impl Lookup {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Absent | Lookup::Corrupt(_) => None,
        }
    }
}

/// Expiring, optionally encrypted key-value layer over a pair of raw backends.
///
/// Holds no data of its own: every call reads or writes through the registry.
/// Expiry is lazy and only enforced when an entry is read.
pub struct StorageOverlay {
    backends: BackendRegistry,
    cipher: Arc<dyn Cipher>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticSink>,
}

impl StorageOverlay {
    pub fn new(backends: BackendRegistry) -> Self {
        Self {
            backends,
            cipher: Arc::new(AesGcmCipher::new()),
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Arc::new(cipher);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    fn backend(&self, kind: BackendKind) -> &dyn RawBackend {
        self.backends.get(kind)
    }

    /// Writes `request.value` under its key, replacing any previous entry.
    #[instrument(skip_all, fields(key = %request.key, backend = %request.backend))]
    pub fn set(&self, request: &StorageRequest) -> Result<()> {
        request.validate()?;

        let envelope = match request.ttl_millis {
            Some(ttl) => Envelope::expiring(request.value.clone(), self.clock.now_millis(), ttl),
            None => Envelope::new(request.value.clone()),
        };
        let text = envelope.to_text()?;
        let stored = match (request.encrypt, request.secret()) {
            (true, Some(secret)) => self.cipher.encrypt(&text, secret)?,
            _ => text,
        };

        self.backend(request.backend)
            .set_item(&request.key, &stored)
    }

    /// Reads a key. Corrupt entries are reported to the sink and read as `None`.
    pub fn get(&self, query: &StorageQuery) -> Result<Option<Value>> {
        let lookup = self.lookup(query)?;
        if let Lookup::Corrupt(diagnostic) = &lookup {
            self.sink.report(diagnostic);
        }
        Ok(lookup.into_value())
    }

    /// Like [`get`](Self::get), then deserializes into `T`. A shape mismatch
    /// is reported as a parse diagnostic and reads as `None`.
    pub fn get_as<T: DeserializeOwned>(&self, query: &StorageQuery) -> Result<Option<T>> {
        let Some(value) = self.get(query)? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(err) => {
                self.sink.report(&Diagnostic::new(
                    query.backend.as_str(),
                    &query.key,
                    DiagnosticKind::Parse,
                    err,
                ));
                Ok(None)
            }
        }
    }

    /// Uncollapsed read. Evicts the entry if it has expired.
    #[instrument(skip_all, fields(key = %query.key, backend = %query.backend))]
    pub fn lookup(&self, query: &StorageQuery) -> Result<Lookup> {
        query.validate()?;
        let backend = self.backend(query.backend);

        let Some(raw) = backend.get_item(&query.key)? else {
            return Ok(Lookup::Absent);
        };
        let corrupt = |kind, detail: &dyn ToString| {
            Lookup::Corrupt(Diagnostic::new(
                query.backend.as_str(),
                &query.key,
                kind,
                detail.to_string(),
            ))
        };

        let text = match query.secret_key.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => match self.cipher.decrypt(&raw, secret) {
                Ok(plaintext) => plaintext,
                Err(err) => return Ok(corrupt(DiagnosticKind::Decrypt, &err)),
            },
            None => raw,
        };
        let envelope = match Envelope::from_text(&text) {
            Ok(envelope) => envelope,
            Err(err) => return Ok(corrupt(DiagnosticKind::Parse, &err)),
        };

        if envelope.is_expired(self.clock.now_millis()) {
            debug!("entry expired, evicting");
            backend.remove_item(&query.key)?;
            return Ok(Lookup::Absent);
        }
        Ok(Lookup::Found(envelope.into_value()))
    }

    /// Every readable, unexpired plain entry in `kind`, in enumeration order.
    ///
    /// Encrypted entries read as corrupt without a secret and are skipped.
    /// Expired entries are evicted along the way.
    #[instrument(skip(self))]
    pub fn get_all(&self, kind: BackendKind) -> Result<IndexMap<String, Value>> {
        let keys = self.backend(kind).keys()?;
        let mut out = IndexMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(&StorageQuery::new(key.as_str(), kind))? {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    /// Deletes `key`; succeeds when it is already gone.
    #[instrument(skip(self))]
    pub fn remove(&self, key: &str, kind: BackendKind) -> Result<()> {
        self.backend(kind).remove_item(key)
    }

    #[instrument(skip(self))]
    pub fn clear(&self, kind: BackendKind) -> Result<()> {
        debug!("clearing backend");
        self.backend(kind).clear()
    }

    pub fn set_many(
        &self,
        requests: &[StorageRequest],
        options: BatchOptions,
    ) -> Result<BatchReport> {
        run_batch(
            requests,
            options,
            |request| request.key.clone(),
            |request| self.set(request),
        )
    }

    pub fn remove_many<S: AsRef<str>>(
        &self,
        keys: &[S],
        kind: BackendKind,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        run_batch(
            keys,
            options,
            |key| AsRef::<str>::as_ref(*key).to_string(),
            |key| self.remove(AsRef::<str>::as_ref(*key), kind),
        )
    }
}
