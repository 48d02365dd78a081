//! Similarity recommendation core for catalog items.
//!
//! This crate implements the three subsystems behind visual similarity
//! recommendations and personalized ranking:
//!
//! - [`vector`] - exact cosine-similarity search over normalized item
//!   embeddings, with a stable external-id to internal-slot mapping and
//!   snapshot persistence
//! - [`cache`] - a bounded LRU + TTL table memoizing expensive inference
//!   results keyed by content hash
//! - [`ranking`] - per-user preference vectors learned from interactions,
//!   blended into candidate re-ranking
//!
//! The embedding model, HTTP surface, and relational persistence are
//! external collaborators. The core consumes them through the seams in
//! [`embedding`] (vector producer, content hash) and [`storage`]
//! (durable byte blobs), so the surrounding service decides the model
//! and the storage backend.
//!
//! # Typical flow
//!
//! A request handler hashes uploaded image bytes, consults the cache for
//! an embedding, computes and caches one on miss, inserts it into the
//! shared vector index, and serves neighbor queries from the index -
//! optionally re-ranked per user by the ranking engine.

pub mod cache;
pub mod config;
pub mod embedding;
pub mod ranking;
pub mod storage;
pub mod vector;

// Explicit exports for better API clarity
pub use cache::{CacheStats, InferenceCache};
pub use config::Settings;
pub use embedding::{EmbeddingGenerator, content_hash};
pub use ranking::{Candidate, RankingEngine, RankingError};
pub use storage::{BlobStore, FsBlobStore, StorageError};
pub use vector::{
    SearchHit, SharedVectorIndex, VectorDimension, VectorError, VectorIndex,
    VECTOR_DIMENSION_512,
};
