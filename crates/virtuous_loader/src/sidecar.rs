//! Detached `.sha256` hash artifacts.
//!
//! A module published at `<url>` advertises its expected digest at
//! `<url>.sha256`. The body is text whose first whitespace-delimited token is
//! the digest, so both a bare digest and `sha256sum` output
//! (`<hex>  client.gen.py`) are accepted.

use std::sync::Arc;

use tracing::debug;

use crate::error::LoaderError;
use crate::transport::Transport;

/// Suffix appended to a module URL to locate its hash artifact.
pub const SIDECAR_SUFFIX: &str = ".sha256";

/// Returns the hash artifact URL for `module_url`. Performs no I/O.
pub fn sidecar_url(module_url: &str) -> String {
    format!("{module_url}{SIDECAR_SUFFIX}")
}

/// Extracts the expected digest from a sidecar body.
pub fn parse_sidecar(body: &[u8]) -> Result<String, LoaderError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| LoaderError::invalid_hash_response(format!("not UTF-8 text: {e}")))?;

    text.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| LoaderError::invalid_hash_response("empty hash response"))
}

/// Renders a sidecar body for `digest` in `sha256sum` format.
pub fn render_sidecar(digest: &str, file_name: &str) -> String {
    format!("{digest}  {file_name}\n")
}

/// Fetches and parses hash artifacts through a [`Transport`].
#[derive(Clone)]
pub struct HashResolver {
    transport: Arc<dyn Transport>,
}

impl HashResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetches the digest published for `module_url`.
    ///
    /// The result is not compared against anything here.
    pub fn resolve_expected_hash(&self, module_url: &str) -> Result<String, LoaderError> {
        let url = sidecar_url(module_url);
        debug!("Resolving expected hash from {}", url);
        let body = self.transport.fetch(&url)?;
        parse_sidecar(&body)
    }
}

impl std::fmt::Debug for HashResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashResolver").finish_non_exhaustive()
    }
}
