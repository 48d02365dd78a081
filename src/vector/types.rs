//! Core types for the vector similarity index.
//!
//! This module provides newtypes and error types following the project's
//! strict type safety guidelines. Dimension checks live here so that every
//! entry point into the index validates against the same configured width.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard embedding dimension for catalog item images (CLIP ViT-B-32).
pub const VECTOR_DIMENSION_512: usize = 512;

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent
/// dimension mismatches during index and ranking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates the standard 512-dimensional image embedding dimension.
    #[must_use]
    pub const fn dimension_512() -> Self {
        Self(VECTOR_DIMENSION_512)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// A single similarity search result.
///
/// `score` is the inner product of the unit-normalized query and item
/// vectors, i.e. cosine similarity in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// External catalog identifier of the matched item.
    pub item_id: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Errors that can occur during vector index operations.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),
}
