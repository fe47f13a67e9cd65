use std::sync::Arc;

use color_eyre::Result;
use serde_json::Value;
use stash_cookie::{CookieCodec, CookieOptions};
use stash_core::{BackendKind, BatchReport};
use stash_storage::{AesGcmCipher, StorageOverlay, StorageQuery, StorageRequest};
use tracing::{info, warn};

use crate::{
    cli::{CookieCommand, GetArgs, SetArgs},
    config::Config,
    cookies::FileCookieChannel,
    secret::{self, SecretProvider},
    storage,
};

/// Interprets a CLI value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Strings print bare; everything else prints as JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn set(
    overlay: &StorageOverlay,
    args: SetArgs,
    config: &Config,
    keyring: &dyn SecretProvider,
) -> Result<()> {
    let backend = config.backend(args.backend);
    let mut request = StorageRequest::new(args.key, backend, parse_value(&args.value));
    request.ttl_millis = args.ttl;
    if args.encrypt {
        request = request.encrypted(secret::require(&args.secret, config, keyring)?);
    }
    overlay.set(&request)?;
    info!(key = %request.key, %backend, "stored value");
    Ok(())
}

pub fn get(
    overlay: &StorageOverlay,
    args: GetArgs,
    config: &Config,
    keyring: &dyn SecretProvider,
) -> Result<Option<String>> {
    let mut query = StorageQuery::new(args.key, config.backend(args.backend));
    if args.decrypt {
        query = query.secret(secret::require(&args.secret, config, keyring)?);
    }
    Ok(overlay.get(&query)?.as_ref().map(render_value))
}

pub fn list(overlay: &StorageOverlay, backend: BackendKind) -> Result<Vec<String>> {
    Ok(overlay
        .get_all(backend)?
        .iter()
        .map(|(key, value)| format!("{key}\t{}", render_value(value)))
        .collect())
}

pub fn remove(
    overlay: &StorageOverlay,
    keys: &[String],
    backend: BackendKind,
    config: &Config,
) -> Result<()> {
    let report = overlay.remove_many(keys, backend, config.batch_options())?;
    warn_failures(&report);
    Ok(())
}

pub fn clear(overlay: &StorageOverlay, backend: BackendKind) -> Result<()> {
    overlay.clear(backend)?;
    info!(%backend, "cleared backend");
    Ok(())
}

/// Round-trips an encrypted, expiring value through the durable backend.
pub fn run_store_health(overlay: &StorageOverlay) -> Result<()> {
    let check_key = "stash/health-check";
    let expected = Value::String("ok".into());
    overlay.set(
        &StorageRequest::new(check_key, BackendKind::Durable, expected.clone())
            .ttl_millis(60_000)
            .encrypted("health-check"),
    )?;
    let round_trip = overlay.get(
        &StorageQuery::new(check_key, BackendKind::Durable).secret("health-check"),
    )?;
    overlay.remove(check_key, BackendKind::Durable)?;

    if round_trip.as_ref() != Some(&expected) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

pub fn cookie_codec(config: &Config) -> Result<CookieCodec> {
    let jar = storage::cookie_jar_from_config(config)?;
    Ok(
        CookieCodec::new(Arc::new(FileCookieChannel::new(jar)), AesGcmCipher::new())
            .with_defaults(config.cookie.clone()),
    )
}

/// Runs a cookie subcommand and returns the lines to print.
pub fn cookie(
    codec: &CookieCodec,
    command: CookieCommand,
    config: &Config,
    keyring: &dyn SecretProvider,
) -> Result<Vec<String>> {
    match command {
        CookieCommand::Set {
            key,
            value,
            expires,
            max_age,
            path,
            domain,
            secure,
            encrypt,
            secret,
        } => {
            let secret_key = if encrypt {
                Some(secret::require(&secret, config, keyring)?)
            } else {
                None
            };
            let options = CookieOptions {
                key,
                value,
                expires,
                max_age,
                path,
                domain,
                secure,
                encrypt,
                secret_key,
            };
            Ok(vec![codec.set(&options)?])
        }
        CookieCommand::Get {
            keys,
            decrypt,
            secret,
        } => {
            let secret_key = if decrypt {
                Some(secret::require(&secret, config, keyring)?)
            } else {
                None
            };
            Ok(codec
                .get_many(&keys, secret_key.as_deref())?
                .into_iter()
                .map(|(key, value)| format!("{key}\t{value}"))
                .collect())
        }
        CookieCommand::List => Ok(codec
            .entries()?
            .into_iter()
            .map(|(key, value)| format!("{key}\t{value}"))
            .collect()),
        CookieCommand::Remove { keys } => {
            let report = codec.remove_many(&keys, config.batch_options())?;
            warn_failures(&report);
            Ok(Vec::new())
        }
        CookieCommand::Clear => {
            codec.clear()?;
            Ok(Vec::new())
        }
    }
}

fn warn_failures(report: &BatchReport) {
    for failure in &report.failures {
        warn!(key = %failure.key, "batch item failed: {}", failure.error);
    }
}
