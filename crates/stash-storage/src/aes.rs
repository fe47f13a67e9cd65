use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use stash_core::{Cipher, CipherError};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_INFO: &[u8] = b"stash/aes-256-gcm";

/// AES-256-GCM keyed by a passphrase.
///
/// Each message gets a fresh salt and nonce; the key is derived from the
/// secret and salt with HKDF-SHA256. Output is base64 of `salt || nonce || ciphertext`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    pub fn new() -> Self {
        Self
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str, secret: &str) -> Result<String, CipherError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let cipher = build_cipher(secret, &salt)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            cipher
                .encrypt(&nonce, plaintext.as_bytes())
                .map_err(|e| CipherError::Encrypt {
                    reason: e.to_string(),
                })?;

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str, secret: &str) -> Result<String, CipherError> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CipherError::Malformed {
                reason: format!("base64 decode failed: {e}"),
            })?;
        if raw.len() < SALT_LEN + NONCE_LEN {
            return Err(CipherError::Malformed {
                reason: format!(
                    "expected at least {} bytes, got {}",
                    SALT_LEN + NONCE_LEN,
                    raw.len()
                ),
            });
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (nonce_bytes, body) = rest.split_at(NONCE_LEN);
        let cipher = build_cipher(secret, salt)?;
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, body)
            .map_err(|_| CipherError::Authentication)?;
        String::from_utf8(plaintext).map_err(|e| CipherError::Malformed {
            reason: format!("plaintext is not utf-8: {e}"),
        })
    }
}

fn build_cipher(secret: &str, salt: &[u8]) -> Result<Aes256Gcm, CipherError> {
    if secret.is_empty() {
        return Err(CipherError::EmptySecret);
    }
    let hkdf = Hkdf::<Sha256>::new(Some(salt), secret.as_bytes());
    let mut key = [0u8; 32];
    hkdf.expand(KEY_INFO, &mut key)
        .map_err(|e| CipherError::Encrypt {
            reason: format!("key derivation failed: {e}"),
        })?;
    Aes256Gcm::new_from_slice(&key).map_err(|e| CipherError::Encrypt {
        reason: format!("cipher init failed: {e}"),
    })
}
