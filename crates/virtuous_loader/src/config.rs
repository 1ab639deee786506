//! Loader configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheError, ModuleCache};
use crate::error::LoaderError;
use crate::transport::{DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_SIZE, DEFAULT_TIMEOUT, HttpTransport};

/// Prefix for module names synthesized from a content digest.
pub const DEFAULT_NAME_PREFIX: &str = "virtuous_client_";

/// Upper bound for `timeout_secs` (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Whether load calls check fetched bytes against the published sidecar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyPolicy {
    /// Digest is computed for naming only.
    #[default]
    Off,
    /// Fetch `<url>.sha256` and reject mismatching bytes.
    Sidecar,
}

/// Configuration for a [`ModuleLoader`](crate::ModuleLoader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Request timeout in seconds, body included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum redirects followed per fetch.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Maximum accepted response size in bytes.
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Allow fetching from loopback and private addresses.
    #[serde(default = "default_allow_local")]
    pub allow_local: bool,

    /// Prefix for synthesized module names.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    #[serde(default)]
    pub verify: VerifyPolicy,

    /// Keep modules registered when their execution fails.
    #[serde(default)]
    pub keep_failed_modules: bool,

    /// Directory for persisted module sources. Relative paths are resolved
    /// against the configuration file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_redirects() -> u32 {
    DEFAULT_MAX_REDIRECTS
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

fn default_allow_local() -> bool {
    true
}

fn default_name_prefix() -> String {
    DEFAULT_NAME_PREFIX.to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            max_size: default_max_size(),
            allow_local: default_allow_local(),
            name_prefix: default_name_prefix(),
            verify: VerifyPolicy::default(),
            keep_failed_modules: false,
            cache_dir: None,
        }
    }
}

impl LoaderConfig {
    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| LoaderError::filesystem(path, e))?;
        let mut config = Self::from_json(&content)?;

        if let (Some(cache_dir), Some(base)) = (config.cache_dir.as_ref(), path.parent()) {
            if cache_dir.is_relative() {
                config.cache_dir = Some(base.join(cache_dir));
            }
        }

        Ok(config)
    }

    /// Parses and validates a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, LoaderError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LoaderError::config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks limits and the name prefix.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.timeout_secs == 0 {
            return Err(LoaderError::config("timeout_secs must be greater than 0"));
        }
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(LoaderError::config(format!(
                "timeout_secs must be at most {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.max_size == 0 {
            return Err(LoaderError::config("max_size must be greater than 0"));
        }
        if self.name_prefix.is_empty() {
            return Err(LoaderError::Naming("name_prefix must not be empty".into()));
        }
        if self.name_prefix.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LoaderError::Naming(format!(
                "name_prefix '{}' contains whitespace or control characters",
                self.name_prefix.escape_debug()
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the HTTP transport described by this configuration.
    pub fn http_transport(&self) -> HttpTransport {
        HttpTransport::builder()
            .timeout(self.timeout())
            .max_redirects(self.max_redirects)
            .max_size(self.max_size)
            .allow_local(self.allow_local)
            .build()
    }

    /// The configured module cache, or the user cache directory if unset.
    pub fn module_cache(&self) -> Result<ModuleCache, CacheError> {
        match &self.cache_dir {
            Some(dir) => Ok(ModuleCache::with_dir(dir)),
            None => ModuleCache::new(),
        }
    }
}
