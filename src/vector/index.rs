//! Exact cosine-similarity index over catalog item embeddings.
//!
//! Vectors are unit-normalized on the way in, so inner product equals
//! cosine similarity and search is a single pass of dot products. Each
//! item gets a monotonically increasing internal slot that is never
//! reused, with the slot/id mapping kept in both directions so result
//! translation and embedding lookup are O(1).
//!
//! `VectorIndex` is the plain in-memory state; `SharedVectorIndex` wraps
//! it for concurrent use (many searches, infrequent adds) and persists
//! snapshots through a [`BlobStore`] without holding the lock during I/O.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::storage::{BlobStore, StorageError};
use crate::vector::snapshot::{
    self, IndexMetadata, MAPPING_BLOB, MappingSnapshot, METADATA_BLOB, VECTORS_BLOB,
};
use crate::vector::types::{SearchHit, VectorDimension, VectorError};

/// Inner product of two equal-length vectors.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scales a vector to unit L2 norm in place.
///
/// Returns false and leaves the vector untouched when the norm is zero,
/// so degenerate inputs never produce NaN components.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = dot(vector, vector).sqrt();
    if norm == 0.0 {
        return false;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}

/// In-memory state of the similarity index.
///
/// Slots are assigned in insertion order and stay contiguous because
/// items are never deleted; `vectors[slot]` is the embedding for that
/// slot. `next_slot` is persisted separately so slots survive reloads
/// without reuse.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: VectorDimension,
    vectors: Vec<Vec<f32>>,
    slot_to_id: HashMap<u64, String>,
    id_to_slot: HashMap<String, u64>,
    next_slot: u64,
}

impl VectorIndex {
    /// Creates an empty index for vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            slot_to_id: HashMap::new(),
            id_to_slot: HashMap::new(),
            next_slot: 0,
        }
    }

    /// Inserts an item embedding and returns its assigned slot.
    ///
    /// The vector is normalized defensively so the unit-vector invariant
    /// holds regardless of the caller. Validation happens before any
    /// state change; a dimension mismatch leaves the index untouched.
    pub fn insert(&mut self, item_id: &str, vector: &[f32]) -> Result<u64, VectorError> {
        self.dimension.validate_vector(vector)?;

        let mut stored = vector.to_vec();
        l2_normalize(&mut stored);

        let slot = self.next_slot;
        self.vectors.push(stored);
        self.slot_to_id.insert(slot, item_id.to_string());
        self.id_to_slot.insert(item_id.to_string(), slot);
        self.next_slot += 1;

        Ok(slot)
    }

    /// Returns the `k` most similar items to the query vector.
    ///
    /// Results are sorted descending by score; equal scores fall back to
    /// ascending slot (insertion order) so output is deterministic. An
    /// empty index yields an empty vec, and `k` larger than the item
    /// count returns everything.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorError> {
        self.dimension.validate_vector(query)?;

        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut normalized = query.to_vec();
        l2_normalize(&mut normalized);

        let mut scored: Vec<(u64, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, vector)| (slot as u64, dot(&normalized, vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .filter_map(|(slot, score)| {
                self.slot_to_id.get(&slot).map(|item_id| SearchHit {
                    item_id: item_id.clone(),
                    score,
                })
            })
            .collect())
    }

    /// Returns the stored (normalized) embedding for an item.
    ///
    /// Resolves through the reverse id-to-slot map in O(1); absent ids
    /// return `None`.
    #[must_use]
    pub fn embedding(&self, item_id: &str) -> Option<&[f32]> {
        let slot = *self.id_to_slot.get(item_id)?;
        self.vectors.get(slot as usize).map(Vec::as_slice)
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Configured vector dimension.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Captures the persistable mapping state, ordered by slot.
    fn mapping_snapshot(&self) -> MappingSnapshot {
        let mut entries: Vec<(u64, String)> = self
            .slot_to_id
            .iter()
            .map(|(slot, id)| (*slot, id.clone()))
            .collect();
        entries.sort_by_key(|(slot, _)| *slot);

        MappingSnapshot {
            next_slot: self.next_slot,
            entries,
        }
    }

    /// Rebuilds an index from decoded snapshot blobs.
    fn restore(
        dimension: VectorDimension,
        vectors: Vec<Vec<f32>>,
        mapping: MappingSnapshot,
    ) -> Result<Self, StorageError> {
        if mapping.entries.len() != vectors.len() {
            return Err(StorageError::InvalidFormat(format!(
                "mapping has {} entries but vector blob has {}",
                mapping.entries.len(),
                vectors.len()
            )));
        }

        let mut slot_to_id = HashMap::with_capacity(mapping.entries.len());
        let mut id_to_slot = HashMap::with_capacity(mapping.entries.len());
        for (slot, item_id) in &mapping.entries {
            if *slot >= mapping.next_slot || *slot as usize >= vectors.len() {
                return Err(StorageError::InvalidFormat(format!(
                    "mapping slot {slot} out of range"
                )));
            }
            slot_to_id.insert(*slot, item_id.clone());
            id_to_slot.insert(item_id.clone(), *slot);
        }

        Ok(Self {
            dimension,
            vectors,
            slot_to_id,
            id_to_slot,
            next_slot: mapping.next_slot,
        })
    }
}

/// Encoded blobs captured under the lock, written after it is released.
struct SnapshotBlobs {
    vectors: Vec<u8>,
    mapping: MappingSnapshot,
    item_count: usize,
}

impl SnapshotBlobs {
    fn capture(index: &VectorIndex) -> Self {
        Self {
            vectors: snapshot::encode_vectors(index.dimension, &index.vectors),
            mapping: index.mapping_snapshot(),
            item_count: index.len(),
        }
    }
}

/// Thread-safe, persistent handle to the vector index.
///
/// Cloning is cheap; all clones share the same state. Reads run
/// concurrently under a read lock, adds take the write lock only for
/// the in-memory mutation and snapshot capture, and all blob I/O
/// happens with no lock held.
#[derive(Clone)]
pub struct SharedVectorIndex {
    inner: Arc<RwLock<VectorIndex>>,
    store: Arc<dyn BlobStore>,
    dimension: VectorDimension,
}

impl SharedVectorIndex {
    /// Opens the index, restoring any snapshot found in the blob store.
    ///
    /// A missing snapshot starts an empty index; an unreadable one (bad
    /// magic, version or dimension drift, corrupt mapping) logs a
    /// warning and also starts empty rather than failing startup.
    pub fn open(store: Arc<dyn BlobStore>, dimension: VectorDimension) -> Self {
        let index = match Self::try_load(store.as_ref(), dimension) {
            Ok(Some(index)) => {
                info!("Loaded {} items from vector index snapshot", index.len());
                index
            }
            Ok(None) => {
                debug!("No vector index snapshot found, starting empty");
                VectorIndex::new(dimension)
            }
            Err(e) => {
                warn!("Failed to load vector index snapshot, starting empty: {e}");
                VectorIndex::new(dimension)
            }
        };

        Self {
            inner: Arc::new(RwLock::new(index)),
            store,
            dimension,
        }
    }

    fn try_load(
        store: &dyn BlobStore,
        dimension: VectorDimension,
    ) -> Result<Option<VectorIndex>, StorageError> {
        let Some(vector_bytes) = store.read(VECTORS_BLOB)? else {
            return Ok(None);
        };
        let Some(mapping_bytes) = store.read(MAPPING_BLOB)? else {
            return Ok(None);
        };

        let (stored_dimension, vectors) = snapshot::decode_vectors(&vector_bytes)?;
        if stored_dimension != dimension {
            return Err(StorageError::InvalidFormat(format!(
                "snapshot dimension {} does not match configured dimension {}",
                stored_dimension.get(),
                dimension.get()
            )));
        }

        let mapping = snapshot::decode_mapping(&mapping_bytes)?;
        VectorIndex::restore(dimension, vectors, mapping).map(Some)
    }

    /// Adds an item embedding and persists the updated snapshot.
    ///
    /// Persistence failure is logged and does not roll back the
    /// in-memory state; the next successful save catches up.
    pub fn add(&self, item_id: &str, vector: &[f32]) -> Result<u64, VectorError> {
        let (slot, blobs) = {
            let mut index = self.inner.write();
            let slot = index.insert(item_id, vector)?;
            (slot, SnapshotBlobs::capture(&index))
        };

        debug!("Added item {item_id} to vector index at slot {slot}");

        if let Err(e) = self.persist(blobs) {
            warn!("Failed to persist vector index after adding {item_id}: {e}");
        }

        Ok(slot)
    }

    /// Searches for the `k` nearest items to the query vector.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorError> {
        self.inner.read().search(query, k)
    }

    /// Returns the stored embedding for an item, if present.
    #[must_use]
    pub fn embedding(&self, item_id: &str) -> Option<Vec<f32>> {
        self.inner.read().embedding(item_id).map(<[f32]>::to_vec)
    }

    /// Persists the current state as a durable snapshot.
    pub fn save(&self) -> Result<(), StorageError> {
        let blobs = {
            let index = self.inner.read();
            SnapshotBlobs::capture(&index)
        };
        self.persist(blobs)
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Configured vector dimension.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn persist(&self, blobs: SnapshotBlobs) -> Result<(), StorageError> {
        let mapping_bytes = snapshot::encode_mapping(&blobs.mapping)?;

        let mut metadata = match self.store.read(METADATA_BLOB) {
            Ok(Some(bytes)) => IndexMetadata::from_json(&bytes)
                .unwrap_or_else(|_| IndexMetadata::new(self.dimension.get(), blobs.item_count)),
            _ => IndexMetadata::new(self.dimension.get(), blobs.item_count),
        };
        metadata.update(blobs.item_count);

        self.store.write(VECTORS_BLOB, &blobs.vectors)?;
        self.store.write(MAPPING_BLOB, &mapping_bytes)?;
        self.store.write(METADATA_BLOB, &metadata.to_json()?)?;
        Ok(())
    }
}

impl std::fmt::Debug for SharedVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedVectorIndex")
            .field("dimension", &self.dimension)
            .field("items", &self.len())
            .finish()
    }
}
