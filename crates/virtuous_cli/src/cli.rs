//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Virtuous - fetch, verify and load generated client modules
#[derive(Parser)]
#[command(name = "virtuous")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a module and execute it
    Load {
        /// Module URL
        url: String,

        /// Name to register the module under
        #[arg(short, long)]
        name: Option<String>,

        /// Write the module to this path and execute it from there
        #[arg(short, long, value_name = "PATH", conflicts_with = "cache")]
        out: Option<PathBuf>,

        /// Write the module into the module cache and execute it from there
        #[arg(long)]
        cache: bool,

        /// Verify against the published `.sha256` sidecar
        #[arg(long)]
        verify: bool,
    },

    /// Print the SHA-256 digest of a remote module
    Hash {
        /// Module URL
        url: String,
    },

    /// Print the sidecar URL for a module URL
    SidecarUrl {
        /// Module URL
        url: String,
    },

    /// Print the SHA-256 digest of a local file
    Digest {
        /// File to hash
        file: PathBuf,

        /// Write `<file>.sha256` next to the file
        #[arg(long)]
        write_sidecar: bool,
    },

    /// Manage the module cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Remove every cached module
    Clean,
}
