//! # virtuous_loader
//!
//! Fetches generated client modules from a URL, hashes them, optionally
//! verifies them against a published `.sha256` sidecar, and executes them
//! into a shared [`ModuleRegistry`].
//!
//! ## Architecture
//!
//! - [`Transport`]: blocking byte fetch ([`HttpTransport`], [`MemoryTransport`])
//! - [`digest()`]: SHA-256 content digest used for naming and verification
//! - [`HashResolver`]: locates and parses `<url>.sha256`
//! - [`ModuleExecutor`]: pluggable engine that turns source into a namespace
//!   ([`ScriptExecutor`] by default)
//! - [`ModuleLoader`]: the fetch → digest → verify → register → execute pipeline
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use virtuous_loader::{ModuleLoader, ModuleRegistry};
//!
//! let registry = Arc::new(ModuleRegistry::new());
//! let loader = ModuleLoader::builder(Arc::clone(&registry)).build()?;
//!
//! let client = loader.load("http://localhost:8000/client.gen.py", None)?;
//! println!("{} {}", client.name(), client.digest());
//! ```

pub mod cache;
pub mod config;
pub mod digest;
mod error;
pub mod executor;
mod loader;
mod module;
mod registry;
pub mod script;
pub mod security;
pub mod sidecar;
pub mod transport;
mod value;

pub use cache::{CacheError, ModuleCache};
pub use config::{LoaderConfig, VerifyPolicy};
pub use digest::{ContentDigest, IntegrityError, digest};
pub use error::{LoadStage, LoaderError};
pub use executor::{ExecutionError, ModuleExecutor};
pub use loader::{ModuleLoader, ModuleLoaderBuilder};
pub use module::{LoadedModule, ModuleStatus};
pub use registry::ModuleRegistry;
pub use script::ScriptExecutor;
pub use security::{SecurityError, validate_url};
pub use sidecar::{HashResolver, parse_sidecar, sidecar_url};
pub use transport::{HttpTransport, MemoryTransport, Transport, TransportError};
pub use value::{Namespace, Value};
