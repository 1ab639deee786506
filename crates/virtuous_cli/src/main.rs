//! Virtuous CLI
//!
//! Loads generated client modules from a URL and checks them against
//! published SHA-256 sidecars.

mod cli;
mod commands;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use virtuous_loader::LoaderConfig;

use cli::{CacheCommands, Cli, Commands};
use commands::load::Target;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Load {
            url,
            name,
            out,
            cache,
            verify,
        } => {
            let config = load_config(cli.config.as_deref(), cli.timeout)?;
            let target = match (out, cache) {
                (Some(path), _) => Target::Path(path),
                (None, true) => Target::Cache,
                (None, false) => Target::Memory,
            };
            commands::load::run_load(config, &url, name.as_deref(), target, verify)
        }
        Commands::Hash { url } => {
            let config = load_config(cli.config.as_deref(), cli.timeout)?;
            commands::hash::run_hash(&config, &url)
        }
        Commands::SidecarUrl { url } => commands::hash::run_sidecar_url(&url),
        Commands::Digest {
            file,
            write_sidecar,
        } => commands::digest::run_digest(&file, write_sidecar),
        Commands::Cache {
            command: CacheCommands::Clean,
        } => {
            let config = load_config(cli.config.as_deref(), cli.timeout)?;
            commands::cache::run_cache_clean(&config)
        }
    }
}

/// Reads the configuration file, if any, and applies command line overrides.
fn load_config(path: Option<&Path>, timeout: Option<u64>) -> Result<LoaderConfig> {
    let mut config = match path {
        Some(path) => {
            debug!("Using config file {}", path.display());
            LoaderConfig::from_file(path).into_diagnostic()?
        }
        None => LoaderConfig::default(),
    };

    if let Some(secs) = timeout {
        config.timeout_secs = secs;
        config.validate().into_diagnostic()?;
    }

    Ok(config)
}
