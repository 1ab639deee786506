//! Load command implementation

use std::path::PathBuf;
use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use virtuous_loader::{LoadedModule, LoaderConfig, ModuleLoader, ModuleRegistry, VerifyPolicy};

/// Where the fetched source is executed from.
pub enum Target {
    Memory,
    Path(PathBuf),
    Cache,
}

pub fn run_load(
    mut config: LoaderConfig,
    url: &str,
    name: Option<&str>,
    target: Target,
    verify: bool,
) -> Result<()> {
    if verify {
        config.verify = VerifyPolicy::Sidecar;
    }
    let cache = match target {
        Target::Cache => Some(config.module_cache().into_diagnostic()?),
        _ => None,
    };

    let registry = Arc::new(ModuleRegistry::new());
    let loader = ModuleLoader::builder(registry)
        .config(config)
        .build()
        .into_diagnostic()?;

    let module = match (&target, &cache) {
        (Target::Path(path), _) => loader.load_to_disk(url, path, name),
        (Target::Cache, Some(cache)) => loader.load_cached(url, cache, name),
        _ => loader.load(url, name),
    }
    .into_diagnostic()?;

    print_module(&module)
}

fn print_module(module: &LoadedModule) -> Result<()> {
    println!("name:   {}", module.name());
    println!("digest: {}", module.digest());
    if let Some(path) = module.path() {
        println!("path:   {}", path.display());
    }

    let namespace = serde_json::to_string_pretty(&module.namespace()).into_diagnostic()?;
    println!("{namespace}");
    Ok(())
}
