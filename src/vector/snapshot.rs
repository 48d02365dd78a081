//! Snapshot codec for vector index persistence.
//!
//! A saved index is three named blobs, written together as one logical
//! transaction (no partial-write guarantee is assumed; load degrades to an
//! empty index when any blob is missing or unreadable):
//!
//! - `vectors.bin`: binary format, a 16-byte header (magic, version,
//!   dimension, count) followed by contiguous little-endian f32 data
//! - `mapping.bin`: bincode-encoded slot/id mapping plus next-slot counter
//! - `metadata.json`: human-readable snapshot info for inspection

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;
use crate::vector::types::VectorDimension;

/// Blob holding the raw vector data.
pub const VECTORS_BLOB: &str = "vectors.bin";

/// Blob holding the slot/id mapping and next-slot counter.
pub const MAPPING_BLOB: &str = "mapping.bin";

/// Blob holding snapshot metadata.
pub const METADATA_BLOB: &str = "metadata.json";

/// Magic bytes identifying a vector snapshot blob.
const MAGIC_BYTES: &[u8; 4] = b"SRVX";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Size of the vector blob header in bytes.
const HEADER_SIZE: usize = 16;

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Encodes stored vectors into the binary snapshot format.
///
/// All vectors must already match `dimension`; the index enforces this
/// on every insert.
pub fn encode_vectors(dimension: VectorDimension, vectors: &[Vec<f32>]) -> Vec<u8> {
    let dim = dimension.get();
    let mut buf = Vec::with_capacity(HEADER_SIZE + vectors.len() * dim * BYTES_PER_F32);

    buf.extend_from_slice(MAGIC_BYTES);
    buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(dim as u32).to_le_bytes());
    buf.extend_from_slice(&(vectors.len() as u32).to_le_bytes());

    for vector in vectors {
        for value in vector {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    buf
}

/// Decodes the binary snapshot format back into stored vectors.
pub fn decode_vectors(bytes: &[u8]) -> Result<(VectorDimension, Vec<Vec<f32>>), StorageError> {
    if bytes.len() < HEADER_SIZE {
        return Err(StorageError::InvalidFormat(format!(
            "vector blob too small: {} bytes",
            bytes.len()
        )));
    }

    if &bytes[0..4] != MAGIC_BYTES {
        return Err(StorageError::InvalidFormat(
            "vector blob has wrong magic bytes".to_string(),
        ));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != SNAPSHOT_VERSION {
        return Err(StorageError::VersionMismatch {
            expected: SNAPSHOT_VERSION,
            actual: version,
        });
    }

    let dim = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;

    let dimension = VectorDimension::new(dim)
        .map_err(|e| StorageError::InvalidFormat(format!("vector blob header: {e}")))?;

    let expected_len = HEADER_SIZE + count * dim * BYTES_PER_F32;
    if bytes.len() != expected_len {
        return Err(StorageError::InvalidFormat(format!(
            "vector blob length {} does not match header (expected {expected_len})",
            bytes.len()
        )));
    }

    let mut vectors = Vec::with_capacity(count);
    let mut pos = HEADER_SIZE;
    for _ in 0..count {
        let mut vector = Vec::with_capacity(dim);
        for _ in 0..dim {
            let value = f32::from_le_bytes([
                bytes[pos],
                bytes[pos + 1],
                bytes[pos + 2],
                bytes[pos + 3],
            ]);
            vector.push(value);
            pos += BYTES_PER_F32;
        }
        vectors.push(vector);
    }

    Ok((dimension, vectors))
}

/// Persisted form of the slot/id mapping.
///
/// `entries` is ordered by slot so reloads reproduce insertion order
/// exactly; `next_slot` survives independently of the entry count so
/// slots are never reused across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSnapshot {
    pub next_slot: u64,
    pub entries: Vec<(u64, String)>,
}

/// Encodes the mapping snapshot with bincode.
pub fn encode_mapping(mapping: &MappingSnapshot) -> Result<Vec<u8>, StorageError> {
    bincode::serde::encode_to_vec(mapping, bincode::config::standard())
        .map_err(|e| StorageError::Encode(e.to_string()))
}

/// Decodes the mapping snapshot.
pub fn decode_mapping(bytes: &[u8]) -> Result<MappingSnapshot, StorageError> {
    let (mapping, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StorageError::Decode(e.to_string()))?;
    Ok(mapping)
}

/// Metadata describing a persisted index snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Dimension of stored vectors.
    pub dimension: usize,

    /// Number of items in the snapshot.
    pub item_count: usize,

    /// Unix timestamp when first created.
    pub created_at: u64,

    /// Unix timestamp when last updated.
    pub updated_at: u64,

    /// Version of the metadata format.
    pub version: u32,
}

impl IndexMetadata {
    /// Current metadata version.
    const CURRENT_VERSION: u32 = 1;

    /// Create new metadata with current timestamp.
    pub fn new(dimension: usize, item_count: usize) -> Self {
        let now = utc_timestamp();
        Self {
            dimension,
            item_count,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Update the item count and refresh the update timestamp.
    pub fn update(&mut self, item_count: usize) {
        self.item_count = item_count;
        self.updated_at = utc_timestamp();
    }

    /// Serialize to pretty-printed JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec_pretty(self).map_err(|e| StorageError::Encode(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Decode(e.to_string()))
    }
}

/// Current UTC timestamp in seconds since UNIX_EPOCH.
fn utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_codec_round_trip() {
        let dimension = VectorDimension::new(3).unwrap();
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.5, -0.25, 0.125]];

        let bytes = encode_vectors(dimension, &vectors);
        let (decoded_dim, decoded) = decode_vectors(&bytes).unwrap();

        assert_eq!(decoded_dim, dimension);
        assert_eq!(decoded, vectors);
    }

    #[test]
    fn test_vector_codec_empty_index() {
        let dimension = VectorDimension::new(8).unwrap();
        let bytes = encode_vectors(dimension, &[]);

        let (decoded_dim, decoded) = decode_vectors(&bytes).unwrap();
        assert_eq!(decoded_dim.get(), 8);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_rejects_wrong_magic() {
        let dimension = VectorDimension::new(2).unwrap();
        let mut bytes = encode_vectors(dimension, &[vec![1.0, 2.0]]);
        bytes[0] = b'X';

        match decode_vectors(&bytes) {
            Err(StorageError::InvalidFormat(msg)) => assert!(msg.contains("magic")),
            other => panic!("Expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        let dimension = VectorDimension::new(4).unwrap();
        let bytes = encode_vectors(dimension, &[vec![1.0; 4]]);

        assert!(decode_vectors(&bytes[..HEADER_SIZE + 3]).is_err());
        assert!(decode_vectors(&bytes[..7]).is_err());
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let dimension = VectorDimension::new(2).unwrap();
        let mut bytes = encode_vectors(dimension, &[]);
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());

        match decode_vectors(&bytes) {
            Err(StorageError::VersionMismatch { expected, actual }) => {
                assert_eq!(expected, SNAPSHOT_VERSION);
                assert_eq!(actual, 99);
            }
            other => panic!("Expected VersionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_mapping_round_trip() {
        let mapping = MappingSnapshot {
            next_slot: 3,
            entries: vec![
                (0, "dress_123".to_string()),
                (1, "shirt_456".to_string()),
                (2, "shoes_789".to_string()),
            ],
        };

        let bytes = encode_mapping(&mapping).unwrap();
        let decoded = decode_mapping(&bytes).unwrap();
        assert_eq!(decoded, mapping);
    }

    #[test]
    fn test_mapping_decode_rejects_garbage() {
        assert!(decode_mapping(&[0xff, 0xfe, 0xfd]).is_err());
    }

    #[test]
    fn test_metadata_round_trip_and_update() {
        let mut metadata = IndexMetadata::new(512, 10);
        assert_eq!(metadata.version, IndexMetadata::CURRENT_VERSION);
        assert_eq!(metadata.created_at, metadata.updated_at);

        metadata.update(25);
        assert_eq!(metadata.item_count, 25);

        let bytes = metadata.to_json().unwrap();
        let decoded = IndexMetadata::from_json(&bytes).unwrap();
        assert_eq!(decoded.dimension, 512);
        assert_eq!(decoded.item_count, 25);
        assert_eq!(decoded.created_at, metadata.created_at);
    }
}
