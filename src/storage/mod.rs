//! Durable storage capabilities for the recommendation core.

mod blob;

pub use blob::{BlobStore, FsBlobStore, StorageError};
