//! Memory manager
//!
//! Coordinates every write into the vector store: embeds content (on a
//! blocking worker, with bounded retry), scores importance, serializes
//! writes per persona, and answers similarity searches with visibility
//! filtering. Reads bump access counters through a best-effort queue drained
//! by a single background task, so hot search paths never contend with the
//! decay worker or the pruner.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::conversation::ConversationContext;
use crate::directory::PersonaDirectory;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::error::{CoreError, Result};
use crate::memory::{Memory, MemoryDraft, MemorySource, MemoryStats, RetrievedMemory, Visibility};
use crate::scoring::importance::ImportanceScorer;
use crate::vector::{MemoryFilter, VectorStore};

/// Embedding attempts before surfacing `EmbedderUnavailable`.
const MAX_EMBED_ATTEMPTS: u32 = 3;

/// Cached query embeddings.
const QUERY_CACHE_SIZE: usize = 256;

/// Debounce window for access-bump batching. Total queue delay stays well
/// under the 1 second visibility bound.
const ACCESS_FLUSH_DEBOUNCE: Duration = Duration::from_millis(200);

struct AccessBump {
    persona_id: String,
    memory_id: String,
}

/// Coordinates all memory reads and writes for every persona collection.
///
/// Writes to one persona are totally ordered (a keyed mutex per persona);
/// reads run concurrently. Construct inside a tokio runtime: the access-bump
/// drain task is spawned on creation.
pub struct MemoryManager {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    scorer: ImportanceScorer,
    directory: Arc<dyn PersonaDirectory>,
    write_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Taken on shutdown so the drain task sees the channel close.
    access_tx: StdMutex<Option<mpsc::UnboundedSender<AccessBump>>>,
    access_drain: StdMutex<Option<JoinHandle<()>>>,
    query_cache: StdMutex<LruCache<String, Vec<f32>>>,
    last_store_at: StdMutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryManager {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &MemoryConfig,
        directory: Arc<dyn PersonaDirectory>,
    ) -> Arc<Self> {
        let (access_tx, access_rx) = mpsc::unbounded_channel();
        let access_drain = tokio::spawn(drain_access_bumps(Arc::clone(&store), access_rx));

        Arc::new(Self {
            store,
            embedder,
            scorer: ImportanceScorer::new(config),
            directory,
            write_locks: StdMutex::new(HashMap::new()),
            access_tx: StdMutex::new(Some(access_tx)),
            access_drain: StdMutex::new(Some(access_drain)),
            query_cache: StdMutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
            last_store_at: StdMutex::new(HashMap::new()),
        })
    }

    /// Stop the access-bump drain task, flushing everything still queued
    /// (including bumps inside the debounce window). Reads after this point
    /// no longer record accesses. Idempotent.
    pub async fn shutdown(&self) {
        let sender = self
            .access_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        let task = self
            .access_drain
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("access-bump drain task ended abnormally: {e}");
            }
        }
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    fn write_lock(&self, persona_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.write_locks.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(persona_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ========================================================================
    // EMBEDDING
    // ========================================================================

    /// Embed on a blocking worker, retrying transient failures with
    /// exponential backoff.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        loop {
            let embedder = Arc::clone(&self.embedder);
            let input = text.to_string();
            let outcome = tokio::task::spawn_blocking(move || embedder.embed(&input)).await;

            match outcome {
                Ok(Ok(vector)) => return Ok(vector),
                Ok(Err(e)) => {
                    attempt += 1;
                    if attempt >= MAX_EMBED_ATTEMPTS {
                        return Err(CoreError::EmbedderUnavailable(e));
                    }
                    let backoff = Duration::from_millis(50u64 << attempt);
                    warn!(attempt, "embedding failed, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                }
                Err(join) => {
                    return Err(CoreError::EmbedderUnavailable(EmbeddingError::Failed(
                        join.to_string(),
                    )));
                }
            }
        }
    }

    async fn query_vector(&self, query: &str) -> Result<Vec<f32>> {
        {
            let mut cache = self.query_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(vector) = cache.get(query) {
                return Ok(vector.clone());
            }
        }
        let vector = self.embed(query).await?;
        self.query_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(query.to_string(), vector.clone());
        Ok(vector)
    }

    // ========================================================================
    // STORE
    // ========================================================================

    /// Create a memory: embed, score, write. Returns the new id.
    ///
    /// Fails with `InvalidPersona` for unknown owners and
    /// `EmbedderUnavailable` when embedding fails after retries.
    pub async fn store(
        &self,
        persona_id: &str,
        draft: MemoryDraft,
        context: Option<&ConversationContext>,
    ) -> Result<String> {
        let persona = self
            .directory
            .persona(persona_id)?
            .ok_or_else(|| CoreError::InvalidPersona(persona_id.to_string()))?;

        let lock = self.write_lock(persona_id);
        let _guard = lock.lock().await;

        let vector = self.embed(&draft.content).await?;

        // Relationship signal: the conversation partner if there is one,
        // otherwise the first related persona named by the draft.
        let partner = context
            .and_then(|c| {
                c.participants
                    .iter()
                    .find(|p| p.as_str() != persona_id)
                    .cloned()
            })
            .or_else(|| draft.related_personas.iter().next().cloned());
        let relationship = match partner {
            Some(ref other) => self.directory.relationship(persona_id, other)?,
            None => None,
        };

        let now = Utc::now();
        let previous_store = self
            .last_store_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(persona_id)
            .copied();

        let importance = match draft.importance {
            Some(explicit) => explicit.clamp(0.0, 1.0),
            None => self.scorer.score(
                &draft,
                &persona,
                context,
                relationship.as_ref(),
                previous_store,
                now,
            ),
        };

        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            persona_id: persona_id.to_string(),
            content: draft.content,
            importance,
            created_at: now,
            last_accessed: None,
            accessed_count: 0,
            memory_type: draft.memory_type,
            visibility: draft.visibility,
            related_personas: draft.related_personas,
            emotional_valence: draft.emotional_valence.clamp(-1.0, 1.0),
            metadata: draft.metadata,
        };
        let id = memory.id.clone();

        self.store.ensure_collection(persona_id).await;
        self.store.upsert(persona_id, &id, vector, memory).await?;

        self.last_store_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(persona_id.to_string(), now);

        debug!(persona = persona_id, memory = %id, importance, "stored memory");
        Ok(id)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Similarity search within one persona's own collection.
    ///
    /// An empty query returns the filtered collection instead of ranked
    /// results. Returned memories get a best-effort access bump.
    pub async fn search(
        &self,
        persona_id: &str,
        query: &str,
        k: usize,
        min_importance: f64,
    ) -> Result<Vec<RetrievedMemory>> {
        if !self.directory.contains(persona_id)? {
            return Err(CoreError::InvalidPersona(persona_id.to_string()));
        }

        let filter = MemoryFilter::with_min_importance(min_importance);
        let matches = if query.trim().is_empty() {
            self.store.query(persona_id, None, &filter, k).await?
        } else {
            let vector = self.query_vector(query).await?;
            self.store
                .query(persona_id, Some(&vector), &filter, k)
                .await?
        };

        let mut hits: Vec<RetrievedMemory> = matches
            .into_iter()
            .map(|m| RetrievedMemory {
                similarity: m.similarity,
                source_persona: persona_id.to_string(),
                source: MemorySource::Own,
                memory: m.memory,
            })
            .collect();
        order_hits(&mut hits);

        self.queue_access_bumps(&hits);
        Ok(hits)
    }

    /// Similarity search across every persona collection.
    ///
    /// The requester sees all of its own memories; from every other
    /// collection only `shared`/`public` memories are considered, gated by
    /// the two include flags. Foreign `private` memories never cross this
    /// boundary, whatever their `related_personas` claim.
    pub async fn search_cross_persona(
        &self,
        requesting_persona_id: &str,
        query: &str,
        k: usize,
        min_importance: f64,
        include_shared: bool,
        include_public: bool,
    ) -> Result<Vec<RetrievedMemory>> {
        if !self.directory.contains(requesting_persona_id)? {
            return Err(CoreError::InvalidPersona(requesting_persona_id.to_string()));
        }

        let query_vector = if query.trim().is_empty() {
            None
        } else {
            Some(self.query_vector(query).await?)
        };

        let mut foreign_visibility = Vec::new();
        if include_shared {
            foreign_visibility.push(Visibility::Shared);
        }
        if include_public {
            foreign_visibility.push(Visibility::Public);
        }

        let mut hits = Vec::new();
        for collection_id in self.store.collection_ids().await {
            let own = collection_id == requesting_persona_id;
            if !own && foreign_visibility.is_empty() {
                continue;
            }
            let filter = MemoryFilter {
                min_importance,
                visibility: if own {
                    None
                } else {
                    Some(foreign_visibility.clone())
                },
                memory_type: None,
            };
            let matches = self
                .store
                .query(&collection_id, query_vector.as_deref(), &filter, k)
                .await?;
            hits.extend(matches.into_iter().map(|m| RetrievedMemory {
                similarity: m.similarity,
                source_persona: collection_id.clone(),
                source: if own {
                    MemorySource::Own
                } else {
                    MemorySource::CrossPersona
                },
                memory: m.memory,
            }));
        }

        // Invariant backstop: a foreign private memory past the filter is a
        // bug. Log it, drop it, and never let it reach the caller.
        let before = hits.len();
        hits.retain(|h| {
            !(h.source == MemorySource::CrossPersona && h.memory.visibility == Visibility::Private)
        });
        if hits.len() != before {
            error!(
                requester = requesting_persona_id,
                dropped = before - hits.len(),
                "visibility filter leak caught in cross-persona merge"
            );
        }

        order_hits(&mut hits);
        if k > 0 {
            hits.truncate(k);
        }

        self.queue_access_bumps(&hits);
        Ok(hits)
    }

    /// Every memory in a persona's collection, unranked. Used by the decay
    /// worker and the pruner; does not bump access counters.
    pub async fn all_memories(&self, persona_id: &str) -> Result<Vec<Memory>> {
        let matches = self
            .store
            .query(persona_id, None, &MemoryFilter::default(), 0)
            .await?;
        Ok(matches.into_iter().map(|m| m.memory).collect())
    }

    // ========================================================================
    // UPDATES
    // ========================================================================

    /// Batched importance rewrite, forwarded to the vector store. Ids that
    /// vanished since the caller's scan are skipped.
    pub async fn update_importance(
        &self,
        persona_id: &str,
        updates: &[(String, f64)],
    ) -> Result<usize> {
        let lock = self.write_lock(persona_id);
        let _guard = lock.lock().await;

        let mut ids = Vec::with_capacity(updates.len());
        let mut records = Vec::with_capacity(updates.len());
        for (id, importance) in updates {
            if let Some(mut memory) = self.store.get(persona_id, id).await {
                memory.importance = importance.clamp(0.0, 1.0);
                ids.push(id.clone());
                records.push(memory);
            }
        }
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self
            .store
            .batch_update_metadata(persona_id, &ids, &records)
            .await?)
    }

    /// Delete memories by id under the persona's write lock.
    pub async fn delete(&self, persona_id: &str, ids: &[String]) -> Result<usize> {
        let lock = self.write_lock(persona_id);
        let _guard = lock.lock().await;
        Ok(self.store.delete(persona_id, ids).await?)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    pub async fn stats(&self, persona_id: &str) -> Result<MemoryStats> {
        let memories = self.all_memories(persona_id).await?;
        let mut stats = MemoryStats {
            total_memories: memories.len(),
            ..Default::default()
        };
        let mut importance_sum = 0.0;
        for memory in &memories {
            *stats
                .memory_types
                .entry(memory.memory_type.clone())
                .or_default() += 1;
            *stats
                .by_visibility
                .entry(memory.visibility.as_str().to_string())
                .or_default() += 1;
            importance_sum += memory.importance;
        }
        if !memories.is_empty() {
            stats.average_importance = importance_sum / memories.len() as f64;
        }
        Ok(stats)
    }

    pub async fn count(&self, persona_id: &str) -> usize {
        self.store.count(persona_id).await
    }

    /// Persona ids with an existing collection.
    pub async fn personas_with_collections(&self) -> Vec<String> {
        self.store.collection_ids().await
    }

    fn queue_access_bumps(&self, hits: &[RetrievedMemory]) {
        let guard = self.access_tx.lock().unwrap_or_else(|e| e.into_inner());
        // Best-effort: a missing or closed channel means shutdown is underway.
        let Some(tx) = guard.as_ref() else {
            return;
        };
        for hit in hits {
            let _ = tx.send(AccessBump {
                persona_id: hit.source_persona.clone(),
                memory_id: hit.memory.id.clone(),
            });
        }
    }
}

/// Tie-break ordering: similarity, then importance, then recency.
fn order_hits(hits: &mut [RetrievedMemory]) {
    hits.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| b.memory.importance.total_cmp(&a.memory.importance))
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
    });
}

/// Single drain task applying queued access bumps in small batches. A bump
/// for a deleted id is a no-op inside the store.
async fn drain_access_bumps(store: Arc<VectorStore>, mut rx: mpsc::UnboundedReceiver<AccessBump>) {
    while let Some(first) = rx.recv().await {
        let mut by_persona: HashMap<String, Vec<String>> = HashMap::new();
        by_persona
            .entry(first.persona_id)
            .or_default()
            .push(first.memory_id);

        // Let a burst of reads coalesce into one write per persona.
        tokio::time::sleep(ACCESS_FLUSH_DEBOUNCE).await;
        while let Ok(bump) = rx.try_recv() {
            by_persona
                .entry(bump.persona_id)
                .or_default()
                .push(bump.memory_id);
        }

        let now = Utc::now();
        for (persona_id, ids) in by_persona {
            let bumped = store.record_access(&persona_id, &ids, now).await;
            debug!(persona = %persona_id, queued = ids.len(), bumped, "flushed access bumps");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
