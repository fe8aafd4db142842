//! Vector store - per-persona similarity collections
//!
//! One logical collection per persona, keyed by persona id. Records pair a
//! unit-normalized vector with the full structured memory record (nothing is
//! flattened to strings at this boundary). Cosine similarity, exact scan:
//! the pruner caps collections near a thousand records, and both the decay
//! worker and the pruner need metadata-filtered and empty-query scans that
//! an ANN index cannot serve.
//!
//! Concurrency: reads run concurrently with writes through the per-collection
//! `RwLock`; each id is replaced wholesale so readers never observe torn
//! metadata. Write ordering is the memory manager's job (single writer per
//! persona).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::embeddings::cosine_similarity;
use crate::memory::{Memory, Visibility};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector store error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorStoreError {
    /// Operation addressed a collection that was never created
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    /// Vector length does not match the store's dimensionality
    #[error("invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions { expected: usize, got: usize },
    /// Paired-array batch update with mismatched lengths
    #[error("batch length mismatch: {ids} ids, {records} records")]
    BatchMismatch { ids: usize, records: usize },
}

// ============================================================================
// FILTER & RESULTS
// ============================================================================

/// Metadata filter applied before ranking.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Drop records below this importance
    pub min_importance: f64,
    /// When set, only these visibilities pass
    pub visibility: Option<Vec<Visibility>>,
    /// When set, only this kind passes
    pub memory_type: Option<String>,
}

impl MemoryFilter {
    pub fn with_min_importance(min_importance: f64) -> Self {
        Self {
            min_importance,
            ..Self::default()
        }
    }

    fn matches(&self, memory: &Memory) -> bool {
        if memory.importance < self.min_importance {
            return false;
        }
        if let Some(ref allowed) = self.visibility {
            if !allowed.contains(&memory.visibility) {
                return false;
            }
        }
        if let Some(ref kind) = self.memory_type {
            if &memory.memory_type != kind {
                return false;
            }
        }
        true
    }
}

/// One ranked hit from a collection query.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub memory: Memory,
    /// Cosine similarity to the query vector; 0.0 on empty-query scans.
    pub similarity: f32,
}

// ============================================================================
// COLLECTION
// ============================================================================

#[derive(Debug, Clone)]
struct VectorRecord {
    vector: Vec<f32>,
    memory: Memory,
}

#[derive(Default)]
struct Collection {
    records: RwLock<HashMap<String, VectorRecord>>,
}

// ============================================================================
// VECTOR STORE
// ============================================================================

/// Embedding-backed similarity store keyed by persona.
pub struct VectorStore {
    dimensions: usize,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl VectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn collection(&self, persona_id: &str) -> Option<Arc<Collection>> {
        self.collections.read().await.get(persona_id).cloned()
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), VectorStoreError> {
        if vector.len() != self.dimensions {
            return Err(VectorStoreError::InvalidDimensions {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Create the collection for a persona. Idempotent.
    pub async fn ensure_collection(&self, persona_id: &str) {
        let mut map = self.collections.write().await;
        map.entry(persona_id.to_string()).or_default();
    }

    /// Ids of all existing collections.
    pub async fn collection_ids(&self) -> Vec<String> {
        self.collections.read().await.keys().cloned().collect()
    }

    /// Number of records in a persona's collection (0 for unknown personas).
    pub async fn count(&self, persona_id: &str) -> usize {
        match self.collection(persona_id).await {
            Some(c) => c.records.read().await.len(),
            None => 0,
        }
    }

    /// Insert or fully overwrite one record.
    pub async fn upsert(
        &self,
        persona_id: &str,
        id: &str,
        vector: Vec<f32>,
        memory: Memory,
    ) -> Result<(), VectorStoreError> {
        self.check_dimensions(&vector)?;
        let collection = self
            .collection(persona_id)
            .await
            .ok_or_else(|| VectorStoreError::UnknownCollection(persona_id.to_string()))?;

        let mut records = collection.records.write().await;
        records.insert(id.to_string(), VectorRecord { vector, memory });
        Ok(())
    }

    /// Replace the metadata of many records, atomically per id.
    ///
    /// `ids` and `records` are paired arrays; the stored vector is kept.
    /// Ids that no longer exist are skipped (a late update racing a delete is
    /// a no-op). Returns the number actually updated.
    pub async fn batch_update_metadata(
        &self,
        persona_id: &str,
        ids: &[String],
        records: &[Memory],
    ) -> Result<usize, VectorStoreError> {
        if ids.len() != records.len() {
            return Err(VectorStoreError::BatchMismatch {
                ids: ids.len(),
                records: records.len(),
            });
        }
        let collection = self
            .collection(persona_id)
            .await
            .ok_or_else(|| VectorStoreError::UnknownCollection(persona_id.to_string()))?;

        let mut map = collection.records.write().await;
        let mut updated = 0;
        for (id, memory) in ids.iter().zip(records.iter()) {
            if let Some(record) = map.get_mut(id) {
                record.memory = memory.clone();
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Bump access counters in place without touching other metadata.
    ///
    /// Deliberately narrower than [`Self::batch_update_metadata`]: an access
    /// bump applied late must not resurrect importance a concurrent decay
    /// batch already lowered. Missing ids are skipped.
    pub async fn record_access(
        &self,
        persona_id: &str,
        ids: &[String],
        at: chrono::DateTime<chrono::Utc>,
    ) -> usize {
        let Some(collection) = self.collection(persona_id).await else {
            return 0;
        };
        let mut map = collection.records.write().await;
        let mut bumped = 0;
        for id in ids {
            if let Some(record) = map.get_mut(id) {
                record.memory.record_access(at);
                bumped += 1;
            }
        }
        bumped
    }

    /// Delete records by id. Unknown ids are ignored. Returns deleted count.
    pub async fn delete(&self, persona_id: &str, ids: &[String]) -> Result<usize, VectorStoreError> {
        let collection = self
            .collection(persona_id)
            .await
            .ok_or_else(|| VectorStoreError::UnknownCollection(persona_id.to_string()))?;

        let mut map = collection.records.write().await;
        let mut deleted = 0;
        for id in ids {
            if map.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Fetch one record's memory, if present.
    pub async fn get(&self, persona_id: &str, id: &str) -> Option<Memory> {
        let collection = self.collection(persona_id).await?;
        let map = collection.records.read().await;
        map.get(id).map(|r| r.memory.clone())
    }

    /// Query a collection.
    ///
    /// With a vector: filtered records ranked by descending cosine
    /// similarity, truncated to `k`. Without one: every record matching the
    /// filter, in arbitrary order - callers must not rely on ordering, and
    /// `k == 0` means unbounded.
    ///
    /// Unknown collections return an empty result rather than an error so
    /// cross-persona fan-out does not have to special-case them.
    pub async fn query(
        &self,
        persona_id: &str,
        query_vector: Option<&[f32]>,
        filter: &MemoryFilter,
        k: usize,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        if let Some(v) = query_vector {
            self.check_dimensions(v)?;
        }
        let Some(collection) = self.collection(persona_id).await else {
            return Ok(Vec::new());
        };

        let records = collection.records.read().await;
        let mut matches: Vec<QueryMatch> = records
            .values()
            .filter(|r| filter.matches(&r.memory))
            .map(|r| QueryMatch {
                similarity: query_vector
                    .map(|q| cosine_similarity(q, &r.vector))
                    .unwrap_or(0.0),
                memory: r.memory.clone(),
            })
            .collect();
        drop(records);

        if query_vector.is_some() {
            matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
            if k > 0 {
                matches.truncate(k);
            }
        } else if k > 0 && matches.len() > k {
            matches.truncate(k);
        }
        Ok(matches)
    }
}

// ============================================================================
// TESTS
// ============================================================================
