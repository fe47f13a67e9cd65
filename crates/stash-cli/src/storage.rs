use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use stash_core::{BackendRegistry, MemoryBackend};
use stash_storage::{FileBackend, StorageOverlay};
use tracing::debug;

const DURABLE_FILE: &str = "durable.json";
const COOKIE_FILE: &str = "cookies.txt";

/// Resolve the default data directory for stash.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("stash"))
}

/// Data directory honoring the config override.
pub fn data_dir_from_config(config: &Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(root) => Ok(root.clone()),
        None => default_data_dir(),
    }
}

/// Overlay with an on-disk durable backend and a session backend that lives for this process.
pub fn overlay_from_config(config: &Config) -> Result<StorageOverlay> {
    let root = data_dir_from_config(config)?;
    debug!(?root, "initializing storage overlay");
    Ok(overlay_at(root))
}

pub fn overlay_at(root: impl Into<PathBuf>) -> StorageOverlay {
    let durable = FileBackend::new(root.into().join(DURABLE_FILE));
    StorageOverlay::new(BackendRegistry::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(durable),
    ))
}

/// Path of the persisted cookie jar.
pub fn cookie_jar_from_config(config: &Config) -> Result<PathBuf> {
    if let Some(path) = &config.cookie_jar {
        return Ok(path.clone());
    }
    Ok(data_dir_from_config(config)?.join(COOKIE_FILE))
}
