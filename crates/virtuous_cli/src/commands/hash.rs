//! Remote hash commands

use miette::{IntoDiagnostic, Result};
use tracing::info;
use virtuous_loader::{LoaderConfig, Transport, digest, sidecar_url};

/// Fetches `url` and prints the digest of its bytes.
pub fn run_hash(config: &LoaderConfig, url: &str) -> Result<()> {
    let transport = config.http_transport();
    let bytes = transport.fetch(url).into_diagnostic()?;
    info!("Fetched {} bytes from {}", bytes.len(), url);

    println!("{}", digest(&bytes));
    Ok(())
}

pub fn run_sidecar_url(url: &str) -> Result<()> {
    println!("{}", sidecar_url(url));
    Ok(())
}
