use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stash_core::BackendKind;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "stash",
    about = "Expiring, optionally encrypted key-value storage and cookie jar",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a value (JSON, or plain text stored as a string).
    Set(SetArgs),
    /// Print a stored value.
    Get(GetArgs),
    /// Print every readable, unexpired entry.
    List {
        #[arg(long, value_parser = parse_backend)]
        backend: Option<BackendKind>,
    },
    /// Delete one or more keys.
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long, value_parser = parse_backend)]
        backend: Option<BackendKind>,
    },
    /// Delete every key in a backend.
    Clear {
        #[arg(long, value_parser = parse_backend)]
        backend: Option<BackendKind>,
    },
    /// Manage the persisted cookie jar.
    #[command(subcommand)]
    Cookie(CookieCommand),
    /// Round-trip a value through the durable backend.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SetArgs {
    pub key: String,
    pub value: String,
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<BackendKind>,
    /// Time-to-live in milliseconds.
    #[arg(long)]
    pub ttl: Option<u64>,
    #[arg(long)]
    pub encrypt: bool,
    #[command(flatten)]
    pub secret: SecretArgs,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GetArgs {
    pub key: String,
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<BackendKind>,
    #[arg(long)]
    pub decrypt: bool,
    #[command(flatten)]
    pub secret: SecretArgs,
}

/// Where the encryption secret comes from. Falls back to the configured env var.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretArgs {
    #[arg(long)]
    pub secret: Option<String>,
    /// Use (and create on first use) a secret held in the OS keyring.
    #[arg(long, conflicts_with = "secret")]
    pub keyring: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CookieCommand {
    /// Write a cookie.
    Set {
        key: String,
        value: String,
        /// HTTP date or RFC 3339 timestamp.
        #[arg(long)]
        expires: Option<String>,
        #[arg(long)]
        max_age: Option<i64>,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        secure: bool,
        #[arg(long)]
        encrypt: bool,
        #[command(flatten)]
        secret: SecretArgs,
    },
    /// Print the values of one or more cookies.
    Get {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long)]
        decrypt: bool,
        #[command(flatten)]
        secret: SecretArgs,
    },
    /// Print every cookie.
    List,
    /// Expire one or more cookies.
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Expire every cookie.
    Clear,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

fn parse_backend(name: &str) -> Result<BackendKind, String> {
    name.parse().map_err(|err: stash_core::ValidationError| err.to_string())
}
