//! In-process representation of a loaded module.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::digest::ContentDigest;
use crate::value::{Namespace, Value};

/// Execution state of a [`LoadedModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Registered but not yet executed.
    Pending,
    /// Top-level execution completed.
    Ready,
    /// Top-level execution failed; the namespace holds whatever was bound
    /// before the failure.
    Failed,
}

/// A fetched module together with its provenance and namespace.
///
/// Modules are shared through `Arc` between the registry and callers, so the
/// namespace and status use interior mutability for the execution step that
/// follows registration.
#[derive(Debug)]
pub struct LoadedModule {
    name: String,
    origin: String,
    digest: ContentDigest,
    path: Option<PathBuf>,
    status: RwLock<ModuleStatus>,
    namespace: RwLock<Namespace>,
}

impl LoadedModule {
    /// Creates a module whose source lives only in memory.
    pub fn new(name: impl Into<String>, origin: impl Into<String>, digest: ContentDigest) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            digest,
            path: None,
            status: RwLock::new(ModuleStatus::Pending),
            namespace: RwLock::new(Namespace::new()),
        }
    }

    /// Binds the module to a persisted copy of its source.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL the source was fetched from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// Path of the on-disk copy, for modules loaded through a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn status(&self) -> ModuleStatus {
        *self.status.read()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModuleStatus::Ready
    }

    /// Looks up a top-level definition.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.namespace.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.namespace.read().contains_key(name)
    }

    /// Names of all top-level definitions, sorted.
    pub fn names(&self) -> Vec<String> {
        self.namespace.read().keys().cloned().collect()
    }

    /// Snapshot of the namespace.
    pub fn namespace(&self) -> Namespace {
        self.namespace.read().clone()
    }

    /// Runs `f` against the namespace and records the outcome as the status.
    pub(crate) fn populate<E>(
        &self,
        f: impl FnOnce(&mut Namespace) -> Result<(), E>,
    ) -> Result<(), E> {
        let result = {
            let mut namespace = self.namespace.write();
            f(&mut namespace)
        };
        *self.status.write() = if result.is_ok() {
            ModuleStatus::Ready
        } else {
            ModuleStatus::Failed
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest;

    #[test]
    fn new_module_is_pending_and_empty() {
        let module = LoadedModule::new("m", "http://h/m.py", digest(b"x = 1\n"));

        assert_eq!(module.name(), "m");
        assert_eq!(module.origin(), "http://h/m.py");
        assert_eq!(module.status(), ModuleStatus::Pending);
        assert!(module.path().is_none());
        assert!(module.names().is_empty());
    }

    #[test]
    fn populate_records_success() {
        let module = LoadedModule::new("m", "http://h/m.py", digest(b""));
        module
            .populate(|ns| {
                ns.insert("x".into(), Value::Int(1));
                Ok::<(), ()>(())
            })
            .unwrap();

        assert!(module.is_ready());
        assert_eq!(module.get("x"), Some(Value::Int(1)));
        assert_eq!(module.names(), vec!["x".to_string()]);
    }

    #[test]
    fn populate_records_failure_and_keeps_partial_bindings() {
        let module = LoadedModule::new("m", "http://h/m.py", digest(b""));
        let result = module.populate(|ns| {
            ns.insert("x".into(), Value::Int(1));
            Err("boom")
        });

        assert_eq!(result, Err("boom"));
        assert_eq!(module.status(), ModuleStatus::Failed);
        assert!(module.contains("x"));
    }

    #[test]
    fn with_path_binds_the_file() {
        let module =
            LoadedModule::new("m", "http://h/m.py", digest(b"")).with_path("/tmp/cache/m.py");
        assert_eq!(module.path(), Some(Path::new("/tmp/cache/m.py")));
    }
}
