//! Name → module table shared by a host and its loaders.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::module::LoadedModule;

/// Registry of loaded modules.
///
/// A host creates one registry, hands it to every [`ModuleLoader`] that
/// should share it, and drops or clears it at teardown. There is at most one
/// entry per name; registering under an existing name replaces the slot but
/// callers still holding the previous `Arc` keep using it.
///
/// [`ModuleLoader`]: crate::ModuleLoader
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<LoadedModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` under its name, returning the entry it replaced.
    pub fn register(&self, module: Arc<LoadedModule>) -> Option<Arc<LoadedModule>> {
        let name = module.name().to_string();
        let previous = self.modules.write().insert(name.clone(), module);
        if previous.is_some() {
            debug!("Replaced registry entry '{}'", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.modules.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    /// Removes the entry for `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.modules.write().remove(name)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.modules.write().clear();
    }

    /// Undoes a registration of `current`, restoring `previous` if given.
    ///
    /// Does nothing if another load has replaced `current` in the meantime.
    pub(crate) fn rollback(
        &self,
        current: &Arc<LoadedModule>,
        previous: Option<Arc<LoadedModule>>,
    ) -> bool {
        let mut modules = self.modules.write();
        match modules.get(current.name()) {
            Some(entry) if Arc::ptr_eq(entry, current) => {}
            _ => return false,
        }
        match previous {
            Some(previous) => {
                modules.insert(current.name().to_string(), previous);
            }
            None => {
                modules.remove(current.name());
            }
        }
        true
    }
}
