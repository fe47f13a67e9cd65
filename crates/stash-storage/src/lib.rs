//! Storage overlay with expiry and encryption at rest.
//! Uses AES-GCM keyed from a caller-supplied secret, over any pair of raw backends.

pub mod aes;
pub mod atomic_file;
pub mod file_backend;
pub mod overlay;
pub mod request;

pub use aes::AesGcmCipher;
pub use file_backend::FileBackend;
pub use overlay::{Lookup, StorageOverlay};
pub use request::{StorageQuery, StorageRequest};
