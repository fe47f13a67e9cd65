use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use stash_cookie::CookieDefaults;
use stash_core::{BackendKind, BatchOptions};

const DEFAULT_SECRET_ENV: &str = "STASH_SECRET";

/// User-level configuration loaded from `~/.config/stash/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory (durable backend and cookie jar).
    pub data_dir: Option<PathBuf>,
    /// Backend used when a command does not pass `--backend`.
    pub default_backend: Option<BackendKind>,
    /// Abort batch commands on the first failing item.
    #[serde(default)]
    pub stop_on_first_error: bool,
    /// Override for the persisted cookie jar file.
    pub cookie_jar: Option<PathBuf>,
    /// Environment variable holding the default secret.
    pub secret_env: Option<String>,
    /// Attributes applied to cookie writes that do not set their own.
    #[serde(default)]
    pub cookie: CookieDefaults,
}

impl Config {
    pub fn backend(&self, requested: Option<BackendKind>) -> BackendKind {
        requested
            .or(self.default_backend)
            .unwrap_or(BackendKind::Durable)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            stop_on_first_error: self.stop_on_first_error,
        }
    }

    pub fn secret_env(&self) -> &str {
        self.secret_env.as_deref().unwrap_or(DEFAULT_SECRET_ENV)
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("stash").join("config.toml"))
}

/// Write `config` to `path` unless a file is already there, so user edits are never clobbered.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
