//! Fetch → digest → verify → name → persist → register → execute.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ModuleCache;
use crate::config::{LoaderConfig, VerifyPolicy};
use crate::digest::{ContentDigest, digest, verify_digest};
use crate::error::{LoadStage, LoaderError};
use crate::executor::{ExecutionError, ModuleExecutor};
use crate::module::LoadedModule;
use crate::registry::ModuleRegistry;
use crate::script::ScriptExecutor;
use crate::sidecar::HashResolver;
use crate::transport::Transport;
use crate::value::Namespace;

/// Loads remote modules into a [`ModuleRegistry`].
///
/// Every load call is synchronous and makes a single attempt: a failure at
/// any stage aborts the rest of the pipeline and a retry starts again from
/// the fetch.
pub struct ModuleLoader {
    transport: Arc<dyn Transport>,
    executor: Arc<dyn ModuleExecutor>,
    registry: Arc<ModuleRegistry>,
    resolver: HashResolver,
    config: LoaderConfig,
}

/// Builder for [`ModuleLoader`].
pub struct ModuleLoaderBuilder {
    registry: Arc<ModuleRegistry>,
    transport: Option<Arc<dyn Transport>>,
    executor: Option<Arc<dyn ModuleExecutor>>,
    config: LoaderConfig,
}

impl ModuleLoaderBuilder {
    /// Use `transport` instead of the HTTP transport built from the config.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use `executor` instead of [`ScriptExecutor`].
    pub fn executor(mut self, executor: Arc<dyn ModuleExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the loader.
    pub fn build(self) -> Result<ModuleLoader, LoaderError> {
        self.config.validate()?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(self.config.http_transport()) as Arc<dyn Transport>);
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ScriptExecutor::new()) as Arc<dyn ModuleExecutor>);

        Ok(ModuleLoader {
            resolver: HashResolver::new(Arc::clone(&transport)),
            transport,
            executor,
            registry: self.registry,
            config: self.config,
        })
    }
}

impl ModuleLoader {
    /// Create a new builder for a loader that registers into `registry`.
    pub fn builder(registry: Arc<ModuleRegistry>) -> ModuleLoaderBuilder {
        ModuleLoaderBuilder {
            registry,
            transport: None,
            executor: None,
            config: LoaderConfig::default(),
        }
    }

    /// Create a loader with the default configuration.
    pub fn new(
        transport: Arc<dyn Transport>,
        executor: Arc<dyn ModuleExecutor>,
        registry: Arc<ModuleRegistry>,
    ) -> Self {
        Self {
            resolver: HashResolver::new(Arc::clone(&transport)),
            transport,
            executor,
            registry,
            config: LoaderConfig::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Resolves the module name: `name` verbatim if non-empty, otherwise the
    /// configured prefix followed by the short digest.
    pub fn module_name(&self, name: Option<&str>, digest: &ContentDigest) -> String {
        match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}{}", self.config.name_prefix, digest.short()),
        }
    }

    /// Fetches the digest published next to `url`.
    pub fn resolve_expected_hash(&self, url: &str) -> Result<String, LoaderError> {
        self.resolver.resolve_expected_hash(url)
    }

    /// Fetches `url` and executes it in memory.
    pub fn load(&self, url: &str, name: Option<&str>) -> Result<Arc<LoadedModule>, LoaderError> {
        self.load_inner(url, name, None, None)
    }

    /// Like [`load`](Self::load), but rejects bytes whose digest differs
    /// from `expected`.
    pub fn load_verified(
        &self,
        url: &str,
        expected: &str,
        name: Option<&str>,
    ) -> Result<Arc<LoadedModule>, LoaderError> {
        self.load_inner(url, name, Some(expected), None)
    }

    /// Fetches `url`, writes it to `path` and executes it from there.
    ///
    /// Missing parent directories are created and an existing file at `path`
    /// is overwritten.
    pub fn load_to_disk(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        name: Option<&str>,
    ) -> Result<Arc<LoadedModule>, LoaderError> {
        self.load_inner(url, name, None, Some(path.as_ref()))
    }

    /// [`load_to_disk`](Self::load_to_disk) into the cache slot for `url`.
    pub fn load_cached(
        &self,
        url: &str,
        cache: &ModuleCache,
        name: Option<&str>,
    ) -> Result<Arc<LoadedModule>, LoaderError> {
        let path = cache.path_for(url);
        self.load_inner(url, name, None, Some(&path))
    }

    fn load_inner(
        &self,
        url: &str,
        name: Option<&str>,
        expected: Option<&str>,
        target: Option<&Path>,
    ) -> Result<Arc<LoadedModule>, LoaderError> {
        info!("Loading module from {}", url);

        debug!("{}: {}", LoadStage::Fetching, url);
        let source = self.transport.fetch(url)?;

        debug!("{}: {} bytes", LoadStage::Hashing, source.len());
        let digest = digest(&source);

        self.verify(url, &digest, expected)?;

        let name = self.module_name(name, &digest);
        debug!("{}: '{}'", LoadStage::Naming, name);

        let module = LoadedModule::new(name, url, digest);
        let module = match target {
            Some(path) => {
                debug!("{}: {}", LoadStage::Persisting, path.display());
                persist(path, &source)?;
                module.with_path(path)
            }
            None => module,
        };

        let module = self.register_and_execute(module, |namespace| match target {
            Some(path) => self.executor.execute_file(path, namespace),
            None => self.executor.execute(&source, url, namespace),
        })?;

        info!(
            "Loaded module '{}' ({}) from {}",
            module.name(),
            module.digest().short(),
            url
        );
        Ok(module)
    }

    fn verify(
        &self,
        url: &str,
        actual: &ContentDigest,
        expected: Option<&str>,
    ) -> Result<(), LoaderError> {
        let expected = match (expected, self.config.verify) {
            (Some(expected), _) => expected.to_string(),
            (None, VerifyPolicy::Sidecar) => self.resolver.resolve_expected_hash(url)?,
            (None, VerifyPolicy::Off) => return Ok(()),
        };

        debug!("{}: expecting {}", LoadStage::Verifying, expected);
        verify_digest(actual, &expected)?;
        Ok(())
    }

    fn register_and_execute(
        &self,
        module: LoadedModule,
        run: impl FnOnce(&mut Namespace) -> Result<(), ExecutionError>,
    ) -> Result<Arc<LoadedModule>, LoaderError> {
        let module = Arc::new(module);

        debug!("{}: '{}'", LoadStage::Registering, module.name());
        let previous = self.registry.register(Arc::clone(&module));

        debug!("{}: '{}'", LoadStage::Executing, module.name());
        match module.populate(run) {
            Ok(()) => Ok(module),
            Err(source) => {
                if !self.config.keep_failed_modules && self.registry.rollback(&module, previous) {
                    warn!(
                        "Rolled back registration of '{}' after execution failure",
                        module.name()
                    );
                }
                Err(LoaderError::ModuleExecution {
                    name: module.name().to_string(),
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Writes `bytes` to `path`, creating parent directories as needed.
fn persist(path: &Path, bytes: &[u8]) -> Result<(), LoaderError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| LoaderError::filesystem(dir, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| LoaderError::filesystem(path, e))
}
