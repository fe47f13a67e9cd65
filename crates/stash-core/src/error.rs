use thiserror::Error;

/// Result alias used across the stash crates.
pub type Result<T> = std::result::Result<T, StashError>;

/// Malformed requests. Always raised before any backend or channel I/O.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("key is required")]
    MissingKey,
    #[error("value is required")]
    MissingValue,
    #[error("invalid backend `{name}`: expected `session` or `durable`")]
    InvalidBackend { name: String },
    #[error("ttl must be greater than 0 milliseconds, got {ttl_millis}")]
    InvalidTtl { ttl_millis: u64 },
    #[error("a secret key must be provided when encryption is requested")]
    MissingSecretKey,
    #[error("invalid expires date: {value}")]
    InvalidExpires { value: String },
    #[error("max-age must not be negative, got {seconds}")]
    InvalidMaxAge { seconds: i64 },
}

/// Failures of the symmetric encryption primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("secret key is empty")]
    EmptySecret,
    #[error("ciphertext is malformed: {reason}")]
    Malformed { reason: String },
    #[error("decryption failed (wrong key or tampered data)")]
    Authentication,
    #[error("encryption failed: {reason}")]
    Encrypt { reason: String },
}

/// Errors surfaced to callers of the storage overlay and the cookie codec.
///
/// Decode and decrypt failures on reads are deliberately absent here: those
/// become "not found" plus a diagnostic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StashError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Underlying backend or channel failure.
    #[error("backend failure: {reason}")]
    Backend { reason: String },
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
}

impl StashError {
    pub fn backend<E: ToString>(err: E) -> Self {
        StashError::Backend {
            reason: err.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StashError::Validation(_))
    }
}

impl From<serde_json::Error> for StashError {
    fn from(err: serde_json::Error) -> Self {
        StashError::Serialization {
            reason: err.to_string(),
        }
    }
}
