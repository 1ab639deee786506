//! Error types for module loading.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::digest::IntegrityError;
use crate::executor::ExecutionError;
use crate::transport::TransportError;

/// Pipeline stage of a single load call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    Fetching,
    Hashing,
    Verifying,
    Naming,
    Persisting,
    Registering,
    Executing,
    Ready,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Hashing => "hashing",
            Self::Verifying => "verifying",
            Self::Naming => "naming",
            Self::Persisting => "persisting",
            Self::Registering => "registering",
            Self::Executing => "executing",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while resolving hashes or loading modules.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Network or HTTP failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The hash sidecar was empty or not text.
    #[error("Invalid hash response: {0}")]
    InvalidHashResponse(String),

    /// The fetched bytes do not match the expected digest.
    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    /// Directory creation or file write failed.
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The module source failed to compile or execute.
    #[error("Module '{name}' failed to execute: {source}")]
    ModuleExecution {
        name: String,
        #[source]
        source: ExecutionError,
    },

    /// Invalid module naming configuration.
    #[error("Naming error: {0}")]
    Naming(String),

    /// Invalid loader configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    /// Creates an invalid hash response error.
    pub fn invalid_hash_response(message: impl Into<String>) -> Self {
        Self::InvalidHashResponse(message.into())
    }

    /// Creates a filesystem error for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The stage at which a load call failed with this error.
    pub fn stage(&self) -> LoadStage {
        match self {
            Self::Transport(_) => LoadStage::Fetching,
            Self::InvalidHashResponse(_) | Self::Integrity(_) => LoadStage::Verifying,
            Self::Filesystem { .. } => LoadStage::Persisting,
            Self::ModuleExecution { .. } => LoadStage::Executing,
            Self::Naming(_) | Self::Config(_) => LoadStage::Naming,
        }
    }

    /// Whether retrying the whole call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}
