use crate::error::CipherError;

/// Symmetric, secret-keyed text encryption used for values at rest.
///
/// Ciphertext must be plain text so it can live in string-only backends and
/// cookie values.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str, secret: &str) -> Result<String, CipherError>;

    /// Fails on malformed ciphertext or a wrong secret.
    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<String, CipherError>;
}
