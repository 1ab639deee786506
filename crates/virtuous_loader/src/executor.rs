//! Module executor abstraction.
//!
//! The loader never interprets module source itself. It hands the fetched
//! bytes (or the file they were persisted to) to a [`ModuleExecutor`], which
//! populates the module's namespace with its top-level definitions.

use std::path::Path;

use thiserror::Error;

use crate::value::Namespace;

/// Errors raised while compiling or running module source.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The source is not valid text for this executor.
    #[error("{origin}: source is not valid UTF-8: {message}")]
    Encoding { origin: String, message: String },

    /// Malformed statement.
    #[error("{origin}:{line}: syntax error: {message}")]
    Syntax {
        origin: String,
        line: usize,
        message: String,
    },

    /// Reference to a name that is not defined.
    #[error("{origin}:{line}: name '{name}' is not defined")]
    Name {
        origin: String,
        line: usize,
        name: String,
    },

    /// Executor-specific runtime failure.
    #[error("{origin}: {message}")]
    Runtime { origin: String, message: String },

    /// Reading the module file failed.
    #[error("failed to read module file: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionError {
    /// Creates a runtime error.
    pub fn runtime(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

/// Trait for module execution engines.
///
/// Implementations must be shareable across threads so a single loader can
/// serve concurrent load calls.
pub trait ModuleExecutor: Send + Sync {
    /// Executes `source` into `namespace`.
    ///
    /// # Arguments
    ///
    /// * `source` - The fetched module bytes
    /// * `origin` - Where the bytes came from, used in diagnostics
    /// * `namespace` - Receives the module's top-level definitions
    ///
    /// Definitions bound before a failure stay in `namespace`.
    fn execute(
        &self,
        source: &[u8],
        origin: &str,
        namespace: &mut Namespace,
    ) -> Result<(), ExecutionError>;

    /// Executes the module persisted at `path`.
    fn execute_file(&self, path: &Path, namespace: &mut Namespace) -> Result<(), ExecutionError> {
        let source = std::fs::read(path)?;
        self.execute(&source, &path.display().to_string(), namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct LengthExecutor;

    impl ModuleExecutor for LengthExecutor {
        fn execute(
            &self,
            source: &[u8],
            origin: &str,
            namespace: &mut Namespace,
        ) -> Result<(), ExecutionError> {
            namespace.insert("len".into(), Value::Int(source.len() as i64));
            namespace.insert("origin".into(), Value::from(origin));
            Ok(())
        }
    }

    #[test]
    fn execute_file_reads_the_file_and_uses_its_path_as_origin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.py");
        std::fs::write(&path, b"abc").unwrap();

        let mut ns = Namespace::new();
        LengthExecutor.execute_file(&path, &mut ns).unwrap();

        assert_eq!(ns["len"], Value::Int(3));
        assert_eq!(ns["origin"], Value::from(path.display().to_string()));
    }

    #[test]
    fn execute_file_reports_missing_file() {
        let mut ns = Namespace::new();
        let result = LengthExecutor.execute_file(Path::new("/nonexistent/m.py"), &mut ns);
        assert!(matches!(result, Err(ExecutionError::Io(_))));
        assert!(ns.is_empty());
    }
}
