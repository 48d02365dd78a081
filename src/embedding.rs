//! Capabilities supplied by the surrounding service.
//!
//! The recommendation core does not know how embeddings are computed or
//! which model produces them; it only needs a producer of fixed-dimension
//! vectors and a stable content hash to key the inference cache. Both
//! capabilities are defined here so backends can vary by configuration.

use sha2::{Digest, Sha256};

use crate::vector::{VectorDimension, VectorError};

/// Trait for generating embeddings from raw item image bytes.
///
/// Implementations should be thread-safe and capable of handling batch
/// processing efficiently. Returned vectors are expected to match
/// `dimension()`; the index re-normalizes defensively either way.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple images.
    ///
    /// # Returns
    /// One vector per input image, in order, or an error.
    fn generate_embeddings(&self, images: &[&[u8]]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Calculate the SHA256 content hash of raw bytes, hex-encoded.
///
/// Used as the inference cache key, so identical uploads resolve to the
/// same cached embedding.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Mock embedding generator for testing.
///
/// Derives a deterministic unit vector from the content hash of each
/// input, so equal bytes always embed identically and distinct bytes
/// almost never collide.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, images: &[&[u8]]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        let mut embeddings = Vec::with_capacity(images.len());

        for image in images {
            let mut hasher = Sha256::new();
            hasher.update(image);
            let digest = hasher.finalize();

            let mut embedding: Vec<f32> = (0..dim)
                .map(|i| {
                    let byte = digest[i % digest.len()];
                    (byte as f32 / 255.0) - 0.5
                })
                .collect();

            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for value in &mut embedding {
                    *value /= magnitude;
                }
            }

            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
