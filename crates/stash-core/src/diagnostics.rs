use std::{
    fmt,
    sync::{Arc, Mutex},
};

use tracing::warn;

/// Why a stored entry could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Ciphertext was malformed or the secret did not match.
    Decrypt,
    /// Text was not a valid envelope, or the value had an unexpected shape.
    Parse,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Decrypt => f.write_str("decrypt"),
            DiagnosticKind::Parse => f.write_str("parse"),
        }
    }
}

/// Non-fatal report about an entry that was treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Where the entry lives (`session`, `durable`, `cookie`).
    pub scope: String,
    pub key: String,
    pub kind: DiagnosticKind,
    /// Underlying error message. Never contains the value or the secret.
    pub detail: String,
}

impl Diagnostic {
    pub fn new(
        scope: impl Into<String>,
        key: impl Into<String>,
        kind: DiagnosticKind,
        detail: impl ToString,
    ) -> Self {
        Self {
            scope: scope.into(),
            key: key.into(),
            kind,
            detail: detail.to_string(),
        }
    }
}

/// Receives diagnostics for corrupt or undecryptable entries.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Emits each diagnostic as a `warn` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        warn!(
            scope = %diagnostic.scope,
            key = %diagnostic.key,
            kind = %diagnostic.kind,
            "failed to read stored value: {}",
            diagnostic.detail
        );
    }
}

/// Keeps diagnostics in memory so tests can assert on them.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    inner: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push(diagnostic.clone());
        }
    }
}
