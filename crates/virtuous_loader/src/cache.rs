use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::digest::digest;

/// Number of URL-digest characters used for a cache entry directory.
const URL_KEY_LEN: usize = 16;

/// File name used when a URL has no usable last segment.
const FALLBACK_FILE_NAME: &str = "module";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache directory resolution failed")]
    DirResolutionFailed,
}

/// On-disk location for persisted module sources.
///
/// Each URL maps to `<dir>/<url key>/<file name>`, so the same URL always
/// lands on the same file and a re-fetch overwrites it.
#[derive(Debug, Clone)]
pub struct ModuleCache {
    cache_dir: PathBuf,
}

impl ModuleCache {
    /// Create a module cache in the user's cache directory.
    pub fn new() -> Result<Self, CacheError> {
        let base_dir = dirs::cache_dir().ok_or(CacheError::DirResolutionFailed)?;
        Ok(Self {
            cache_dir: base_dir.join("virtuous").join("modules"),
        })
    }

    /// Create a module cache rooted at `path`.
    pub fn with_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: path.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path where the source fetched from `url` is stored.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let key = digest(url.as_bytes());
        self.cache_dir
            .join(&key.as_str()[..URL_KEY_LEN])
            .join(file_name_for(url))
    }

    /// Returns the cached path for `url` if a copy exists.
    pub fn get(&self, url: &str) -> Option<PathBuf> {
        let path = self.path_for(url);
        path.is_file().then_some(path)
    }

    /// Remove the cached copy for `url`.
    pub fn remove(&self, url: &str) -> Result<(), CacheError> {
        let path = self.path_for(url);
        if let Some(dir) = path.parent() {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Clear the entire module cache.
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }
}

/// Last URL path segment if it is a single normal path component.
fn file_name_for(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query.rsplit('/').next().unwrap_or_default();

    let path = Path::new(segment);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == segment && !segment.contains('\\') => {
            segment.to_string()
        }
        _ => FALLBACK_FILE_NAME.to_string(),
    }
}
