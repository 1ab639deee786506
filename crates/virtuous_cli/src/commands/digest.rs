//! Digest command implementation

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};
use tracing::info;
use virtuous_loader::digest;
use virtuous_loader::sidecar::{SIDECAR_SUFFIX, render_sidecar};

pub fn run_digest(file: &Path, write_sidecar: bool) -> Result<()> {
    let bytes = std::fs::read(file)
        .map_err(|e| miette::miette!("Failed to read {}: {}", file.display(), e))?;

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| miette::miette!("Not a file path: {}", file.display()))?;

    let line = render_sidecar(digest(&bytes).as_str(), &file_name);
    print!("{line}");

    if write_sidecar {
        let sidecar = sidecar_path(file);
        std::fs::write(&sidecar, line).into_diagnostic()?;
        info!("Wrote {}", sidecar.display());
    }

    Ok(())
}

fn sidecar_path(file: &Path) -> PathBuf {
    let mut path = OsString::from(file.as_os_str());
    path.push(SIDECAR_SUFFIX);
    PathBuf::from(path)
}
