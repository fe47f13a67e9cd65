use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use crate::{cli::SecretArgs, config::Config};

pub const KEYRING_SERVICE: &str = "stash-cli";
pub const KEYRING_ACCOUNT: &str = "secret-key";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("no secret available: pass --secret, use --keyring, or set ${0}")]
    Missing(String),
}

/// Provides a persistent secret (OS keychain in production; memory in tests).
pub trait SecretProvider {
    fn get_or_create(&self) -> Result<String, SecretError>;
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the secret.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl SecretProvider for KeyringProvider {
    fn get_or_create(&self) -> Result<String, SecretError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| SecretError::Keyring(e.to_string()))?;
        if let Ok(secret) = entry.get_password() {
            return Ok(secret);
        }

        let secret = generate_secret();
        entry
            .set_password(&secret)
            .map_err(|e| SecretError::Keyring(e.to_string()))?;
        Ok(secret)
    }
}

/// In-memory provider for tests.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretProvider {
    inner: Arc<Mutex<Option<String>>>,
}

impl SecretProvider for InMemorySecretProvider {
    fn get_or_create(&self) -> Result<String, SecretError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| SecretError::Keyring(format!("lock poisoned: {err}")))?;
        Ok(guard.get_or_insert_with(generate_secret).clone())
    }
}

/// Picks the secret for a command: `--secret`, then `--keyring`, then the configured env var.
/// Returns `None` when no source has one.
pub fn resolve(
    args: &SecretArgs,
    config: &Config,
    keyring: &dyn SecretProvider,
) -> Result<Option<String>, SecretError> {
    if let Some(secret) = args.secret.clone().filter(|s| !s.is_empty()) {
        return Ok(Some(secret));
    }
    if args.keyring {
        return keyring.get_or_create().map(Some);
    }
    Ok(std::env::var(config.secret_env())
        .ok()
        .filter(|s| !s.is_empty()))
}

/// Like [`resolve`], but a missing secret is an error.
pub fn require(
    args: &SecretArgs,
    config: &Config,
    keyring: &dyn SecretProvider,
) -> Result<String, SecretError> {
    resolve(args, config, keyring)?
        .ok_or_else(|| SecretError::Missing(config.secret_env().to_string()))
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}
