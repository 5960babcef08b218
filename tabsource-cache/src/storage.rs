//! Storage abstraction for raw data sources
//!
//! The cache depends on storage through three operations only: an
//! existence probe, a cheap freshness token, and a full payload read.
//! Any byte-addressable store can sit behind this trait; the default
//! implementation is the local filesystem.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// An opaque freshness token for a data source
///
/// Two markers compare equal exactly when the source content is assumed
/// unchanged. A changed marker supersedes the previous cache entry; a
/// marker is never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker(String);

impl Marker {
    /// Create a marker from an opaque token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A read-only byte source with change detection
pub trait Storage: Send + Sync {
    /// Check whether the source exists
    fn exists(&self, path: &Path) -> bool;

    /// Resolve the source's current freshness token
    ///
    /// Must be cheap; implementations must not read the payload here.
    fn modification_marker(&self, path: &Path) -> io::Result<Marker>;

    /// Read the full payload
    fn read_payload(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Local filesystem storage
///
/// The marker combines the file's modification time and length, so a
/// rewrite is detected without hashing the payload.
#[derive(Debug, Clone, Default)]
pub struct FsStorage {
    /// Base directory for relative source paths
    root: Option<PathBuf>,
}

impl FsStorage {
    /// Create a storage rooted at the process working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage that resolves relative paths under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Storage for FsStorage {
    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn modification_marker(&self, path: &Path) -> io::Result<Marker> {
        let metadata = std::fs::metadata(self.resolve(path))?;
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Marker::new(format!(
            "{}.{:09}-{}",
            mtime.as_secs(),
            mtime.subsec_nanos(),
            metadata.len()
        )))
    }

    fn read_payload(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fs_marker_changes_on_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");

        std::fs::write(&path, b"a,b\n1,2\n").unwrap();
        let storage = FsStorage::new();
        let first = storage.modification_marker(&path).unwrap();

        // Longer content guarantees a marker change even on filesystems
        // with coarse mtime resolution.
        std::fs::write(&path, b"a,b\n1,2\n3,4\n").unwrap();
        let second = storage.modification_marker(&path).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_fs_exists_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        assert!(!FsStorage::new().exists(&path));

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"x,y\n").unwrap();
        drop(file);

        let storage = FsStorage::new();
        assert!(storage.exists(&path));
        assert_eq!(storage.read_payload(&path).unwrap(), b"x,y\n");
    }

    #[test]
    fn test_fs_root_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rel.csv"), b"a\n1\n").unwrap();

        let storage = FsStorage::with_root(dir.path());
        assert!(storage.exists(Path::new("rel.csv")));
        assert!(storage.modification_marker(Path::new("rel.csv")).is_ok());
    }
}
