mod cli;
mod commands;
mod config;
mod cookies;
mod secret;
mod storage;

use crate::cli::{Command, ConfigCommand};
use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load()?,
    };
    let keyring = secret::KeyringProvider::default();

    match cli.command {
        Command::Set(args) => {
            let overlay = storage::overlay_from_config(&config)?;
            commands::set(&overlay, args, &config, &keyring)?;
        }
        Command::Get(args) => {
            let overlay = storage::overlay_from_config(&config)?;
            match commands::get(&overlay, args, &config, &keyring)? {
                Some(value) => println!("{value}"),
                None => std::process::exit(1),
            }
        }
        Command::List { backend } => {
            let overlay = storage::overlay_from_config(&config)?;
            for line in commands::list(&overlay, config.backend(backend))? {
                println!("{line}");
            }
        }
        Command::Remove { keys, backend } => {
            let overlay = storage::overlay_from_config(&config)?;
            commands::remove(&overlay, &keys, config.backend(backend), &config)?;
        }
        Command::Clear { backend } => {
            let overlay = storage::overlay_from_config(&config)?;
            commands::clear(&overlay, config.backend(backend))?;
        }
        Command::Cookie(command) => {
            let codec = commands::cookie_codec(&config)?;
            for line in commands::cookie(&codec, command, &config, &keyring)? {
                println!("{line}");
            }
        }
        Command::Health => run_health_check(&config)?,
        Command::Config(ConfigCommand::Init) => init_config(&cli, &config)?,
        Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so command output stays pipeable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("stash {}", env!("CARGO_PKG_VERSION"));
}

fn run_health_check(config: &config::Config) -> Result<()> {
    let overlay = storage::overlay_from_config(config)?;
    commands::run_store_health(&overlay)?;
    println!("Storage: ok");
    Ok(())
}

fn init_config(cli: &cli::Cli, config: &config::Config) -> Result<()> {
    let target = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_path()?,
    };
    let path = config::write_if_missing(config, &target)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
