//! Durable blob storage for index snapshots.
//!
//! The vector index persists itself as a small set of named blobs. This
//! module defines the storage capability as a trait so the surrounding
//! service can swap the filesystem for an object store without touching
//! index code, plus the default filesystem-backed implementation.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from reading or writing durable blobs and snapshot codecs.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}\nSuggestion: Check disk space and file permissions")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob format: {0}\nSuggestion: Rebuild the index snapshot")]
    InvalidFormat(String),

    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode snapshot: {0}\nSuggestion: The blob may be corrupted; rebuild the index snapshot")]
    Decode(String),

    #[error(
        "Invalid snapshot version: expected {expected}, got {actual}\nSuggestion: Migrate the snapshot or use a compatible version"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}

/// Capability for durable byte-blob storage.
///
/// `write` replaces the named blob; `read` returns `None` when the blob
/// does not exist, so a missing snapshot is distinguishable from a
/// corrupted one.
pub trait BlobStore: Send + Sync {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Filesystem-backed blob store rooted at a single directory.
///
/// The root directory is created lazily on first write so that a
/// read-only startup against an empty data dir succeeds.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the directory blobs are stored under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlobStore for FsBlobStore {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.blob_path(name), bytes)?;
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.blob_path(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}
