//! Core contracts for stash: backend primitives, the stored envelope, cipher,
//! clock and diagnostic seams, and the shared error types.
//! Concrete cipher and on-disk backends live in `stash-storage`.

pub mod backend;
pub mod batch;
pub mod cipher;
pub mod clock;
pub mod diagnostics;
pub mod envelope;
pub mod error;

pub use backend::{BackendKind, BackendRegistry, MemoryBackend, RawBackend};
pub use batch::{BatchFailure, BatchOptions, BatchReport};
pub use cipher::Cipher;
pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, RecordingSink, TracingSink};
pub use envelope::Envelope;
pub use error::{CipherError, Result, StashError, ValidationError};
