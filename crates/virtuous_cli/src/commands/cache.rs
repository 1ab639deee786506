//! Cache command implementation

use miette::{IntoDiagnostic, Result};
use tracing::info;
use virtuous_loader::LoaderConfig;

pub fn run_cache_clean(config: &LoaderConfig) -> Result<()> {
    let cache = config.module_cache().into_diagnostic()?;
    cache.clear().into_diagnostic()?;

    info!("Module cache cleaned: {}", cache.dir().display());
    Ok(())
}
