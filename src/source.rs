//! Where source image bytes come from.
//!
//! A [`Source`] maps an identifier to raw, still-encoded bytes. Decoding is
//! the engine's job, not the source's.
//!
//! - [`DiskSource`]: files under a root directory; the identifier is a
//!   relative path.
//! - [`MemorySource`]: an in-memory map, for tests and embedding.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Supplies raw source bytes by identifier. Shared read-only across requests.
pub trait Source: Sync {
    fn read(&self, identifier: &str) -> Result<Vec<u8>, SourceError>;
}

/// Files under `root`.
#[derive(Debug, Clone)]
pub struct DiskSource {
    root: PathBuf,
}

impl DiskSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `identifier` to a path that cannot escape the root.
    fn resolve(&self, identifier: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(identifier);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if identifier.is_empty() || escapes {
            return Err(SourceError::InvalidIdentifier(identifier.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl Source for DiskSource {
    fn read(&self, identifier: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(identifier)?;
        if !path.is_file() {
            return Err(SourceError::NotFound(identifier.to_string()));
        }
        fs::read(&path).map_err(|source| SourceError::Io { path, source })
    }
}

/// Identifier → bytes, held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    images: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, body: Vec<u8>) {
        self.images.insert(identifier.into(), body);
    }
}

impl Source for MemorySource {
    fn read(&self, identifier: &str) -> Result<Vec<u8>, SourceError> {
        self.images
            .get(identifier)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn disk_source_reads_nested_files() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        fs::write(tmp.path().join("a/b/cat.jpg"), b"bytes").unwrap();

        let source = DiskSource::new(tmp.path());
        assert_eq!(source.read("a/b/cat.jpg").unwrap(), b"bytes");
    }

    #[test]
    fn disk_source_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let source = DiskSource::new(tmp.path());
        assert!(matches!(
            source.read("nope.png"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn disk_source_rejects_escaping_identifiers() {
        let tmp = TempDir::new().unwrap();
        let source = DiskSource::new(tmp.path());
        for id in ["", "../secret.jpg", "a/../../b.jpg", "/etc/passwd"] {
            assert!(
                matches!(source.read(id), Err(SourceError::InvalidIdentifier(_))),
                "'{id}' should be rejected"
            );
        }
    }

    #[test]
    fn memory_source_round_trips() {
        let mut source = MemorySource::new();
        source.insert("x", vec![1, 2, 3]);
        assert_eq!(source.read("x").unwrap(), vec![1, 2, 3]);
        assert!(source.read("y").is_err());
    }
}
