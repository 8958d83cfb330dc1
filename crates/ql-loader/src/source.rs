use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ql_core::{codes, QuillError};
use walkdir::WalkDir;

use crate::resolver::PathResolver;

/// Where include files come from. Existence checks drive path resolution;
/// reads happen only after the cycle guard accepted the path.
pub trait SourceProvider {
    fn exists(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> Result<String, QuillError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsSource;

impl FsSource {
    /// Every file with `extension` below `root`, sorted.
    pub fn list_modules(root: &Path, extension: &str) -> Result<Vec<PathBuf>, QuillError> {
        let mut out = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|error| {
                QuillError::new(
                    codes::INCLUDE_READ,
                    format!("Failed to scan {}: {}", root.display(), error),
                )
            })?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().map_or(false, |ext| ext == extension)
            {
                out.push(PathResolver::normalize(path));
            }
        }
        out.sort();
        Ok(out)
    }
}

impl SourceProvider for FsSource {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> Result<String, QuillError> {
        fs::read_to_string(path).map_err(|error| {
            QuillError::new(
                codes::INCLUDE_READ,
                format!("Failed to read {}: {}", path.display(), error),
            )
        })
    }
}

/// In-memory file set, keyed by normalized path.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    files: BTreeMap<PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, P, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<Path>,
        S: Into<String>,
    {
        let mut source = Self::new();
        for (path, text) in entries {
            source.insert(path, text);
        }
        source
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.files
            .insert(PathResolver::normalize(path.as_ref()), text.into());
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }
}

impl SourceProvider for MemorySource {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&PathResolver::normalize(path))
    }

    fn read(&self, path: &Path) -> Result<String, QuillError> {
        self.files
            .get(&PathResolver::normalize(path))
            .cloned()
            .ok_or_else(|| {
                QuillError::new(
                    codes::INCLUDE_READ,
                    format!("No in-memory source at {}.", path.display()),
                )
            })
    }
}
