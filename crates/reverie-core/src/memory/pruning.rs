//! Memory pruning
//!
//! Evicts low-ranked memories when a collection outgrows its threshold.
//! Ranking and safety are deliberately separate phases: eviction scores
//! order the candidates, then protective filters veto individual deletions,
//! so no amount of weight tuning can override a safety rule. Deletions are
//! committed in batch-sized groups with no rollback; a failed batch aborts
//! the rest of the invocation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::memory::manager::MemoryManager;
use crate::memory::{MaintenanceLocks, Memory};

/// Pause between delete batches so readers are never starved.
const INTERBATCH_PAUSE: Duration = Duration::from_millis(100);

/// Bounded metrics history.
const HISTORY_LIMIT: usize = 50;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Eviction ranking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PruningStrategy {
    /// Pure importance ranking
    ImportanceOnly,
    /// Importance plus access frequency
    ImportanceAccess,
    /// Importance, access frequency, and age
    #[default]
    ImportanceAccessAge,
    /// Least recently used first
    Lru,
    /// Oldest first
    Fifo,
}

/// Pruning policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PruningConfig {
    pub strategy: PruningStrategy,
    /// Soft target after a prune; safety rules may keep the count above it
    pub target_memories_per_persona: usize,
    /// Collection size that makes a persona eligible for pruning
    pub pruning_threshold: usize,
    pub importance_weight: f64,
    pub access_weight: f64,
    pub age_weight: f64,
    /// Never delete at or above this importance
    pub max_importance_to_delete: f64,
    /// Never delete memories accessed at least this often
    pub high_access_threshold: u32,
    /// Never delete unaccessed memories younger than this
    pub zero_access_grace_days: i64,
    /// Never delete memories read within this window
    pub recent_access_protection_days: i64,
    /// Full age score at or below this age
    pub recent_memory_days: i64,
    /// Minimum age score at or beyond this age
    pub ancient_memory_days: i64,
    /// Delete batch size
    pub batch_size: usize,
    /// Hard ceiling on the fraction of a collection one invocation may delete
    pub max_prune_percent: f64,
    /// Minimum spacing between non-forced prunes of one persona
    pub min_prune_interval_secs: u64,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            strategy: PruningStrategy::default(),
            target_memories_per_persona: 800,
            pruning_threshold: 900,
            importance_weight: 0.6,
            access_weight: 0.3,
            age_weight: 0.1,
            max_importance_to_delete: 0.7,
            high_access_threshold: 5,
            zero_access_grace_days: 30,
            recent_access_protection_days: 7,
            recent_memory_days: 7,
            ancient_memory_days: 90,
            batch_size: 100,
            max_prune_percent: 0.25,
            min_prune_interval_secs: 3600,
        }
    }
}

// ============================================================================
// METRICS & STATE
// ============================================================================

/// Per-persona pruning phase, surfaced through stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PruneState {
    #[default]
    Idle,
    Checking,
    Scoring,
    Selecting,
    Deleting,
}

/// Outcome of one prune invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruningMetrics {
    pub total_memories_before: usize,
    pub total_memories_after: usize,
    pub memories_pruned: usize,
    /// Candidates vetoed by safety rules
    pub protected_by_safety: usize,
    pub average_importance_pruned: f64,
    pub average_importance_kept: f64,
    pub errors_encountered: u32,
    pub duration_ms: u64,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Dry-run report for `prune_recommendations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneRecommendation {
    pub needs_pruning: bool,
    pub current_count: usize,
    pub target_count: usize,
    pub would_prune: usize,
    pub average_importance_to_prune: f64,
    pub importance_range_to_prune: Option<(f64, f64)>,
}

/// Aggregate pruner statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PrunerStats {
    pub total_operations: u64,
    pub total_memories_pruned: u64,
    pub error_count: u64,
    pub in_progress: Vec<String>,
    pub persona_states: HashMap<String, PruneState>,
    pub last_pruned: HashMap<String, DateTime<Utc>>,
    pub recent: Option<PruningMetrics>,
}

#[derive(Default)]
struct PrunerState {
    in_progress: HashSet<String>,
    phase: HashMap<String, PruneState>,
    last_pruned: HashMap<String, DateTime<Utc>>,
    history: VecDeque<PruningMetrics>,
    total_operations: u64,
    total_pruned: u64,
    error_count: u64,
}

// ============================================================================
// PRUNER
// ============================================================================

/// Safety-checked eviction of low-value memories.
///
/// One invocation per persona at a time (`force` bypasses the guard, not the
/// safety rules), at most once per spacing interval, never deleting more
/// than `max_prune_percent` of a collection.
pub struct MemoryPruner {
    manager: Arc<MemoryManager>,
    locks: Arc<MaintenanceLocks>,
    config: PruningConfig,
    state: StdMutex<PrunerState>,
}

impl MemoryPruner {
    pub fn new(
        manager: Arc<MemoryManager>,
        locks: Arc<MaintenanceLocks>,
        config: PruningConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            locks,
            config,
            state: StdMutex::new(PrunerState::default()),
        })
    }

    pub fn config(&self) -> &PruningConfig {
        &self.config
    }

    /// Whether a prune is currently running for this persona. The decay
    /// worker checks this to skip the persona for the cycle.
    pub fn is_pruning(&self, persona_id: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_progress
            .contains(persona_id)
    }

    /// Whether a persona's collection is eligible for a non-forced prune.
    pub async fn should_prune(&self, persona_id: &str) -> bool {
        if self.is_pruning(persona_id) {
            return false;
        }
        let total = self.manager.count(persona_id).await;
        if total < self.config.pruning_threshold {
            return false;
        }
        !self.recently_pruned(persona_id, Utc::now())
    }

    fn recently_pruned(&self, persona_id: &str, now: DateTime<Utc>) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_pruned.get(persona_id).is_some_and(|at| {
            (now - *at).num_seconds() < self.config.min_prune_interval_secs as i64
        })
    }

    fn set_phase(&self, persona_id: &str, phase: PruneState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.phase.insert(persona_id.to_string(), phase);
    }

    /// Prune one persona's collection.
    ///
    /// Returns `PruneInProgress` when another invocation holds the persona
    /// (unless `force`). Non-forced invocations inside the spacing interval
    /// return empty metrics without touching the collection.
    pub async fn prune_persona(&self, persona_id: &str, force: bool) -> Result<PruningMetrics> {
        let started = std::time::Instant::now();
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.in_progress.contains(persona_id) && !force {
                return Err(CoreError::PruneInProgress(persona_id.to_string()));
            }
            if !force {
                let now = Utc::now();
                let too_soon = state.last_pruned.get(persona_id).is_some_and(|at| {
                    (now - *at).num_seconds() < self.config.min_prune_interval_secs as i64
                });
                if too_soon {
                    debug!(persona = persona_id, "prune skipped, spacing interval not elapsed");
                    return Ok(PruningMetrics::default());
                }
            }
            state.in_progress.insert(persona_id.to_string());
            state.phase.insert(persona_id.to_string(), PruneState::Checking);
        }

        let outcome = self.execute(persona_id).await;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_progress.remove(persona_id);
        state.phase.insert(persona_id.to_string(), PruneState::Idle);
        state.total_operations += 1;

        match outcome {
            Ok(mut metrics) => {
                metrics.duration_ms = started.elapsed().as_millis() as u64;
                metrics.finished_at = Some(Utc::now());
                state.last_pruned.insert(persona_id.to_string(), Utc::now());
                state.total_pruned += metrics.memories_pruned as u64;
                state.error_count += metrics.errors_encountered as u64;
                state.history.push_back(metrics.clone());
                if state.history.len() > HISTORY_LIMIT {
                    state.history.pop_front();
                }
                info!(
                    persona = persona_id,
                    pruned = metrics.memories_pruned,
                    remaining = metrics.total_memories_after,
                    "prune completed"
                );
                Ok(metrics)
            }
            Err(e) => {
                state.error_count += 1;
                Err(e)
            }
        }
    }

    async fn execute(&self, persona_id: &str) -> Result<PruningMetrics> {
        // Held for the whole invocation; keeps the decay worker off this
        // persona while batches are in flight.
        let lock = self.locks.for_persona(persona_id);
        let _guard = lock.lock().await;

        let mut metrics = PruningMetrics::default();
        let now = Utc::now();

        self.set_phase(persona_id, PruneState::Scoring);
        let memories = self.manager.all_memories(persona_id).await?;
        metrics.total_memories_before = memories.len();
        metrics.total_memories_after = memories.len();
        if memories.is_empty() {
            return Ok(metrics);
        }

        let mut scored: Vec<(f64, Memory)> = memories
            .into_iter()
            .map(|m| (self.eviction_score(&m, now), m))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        self.set_phase(persona_id, PruneState::Selecting);
        let prune_count = metrics
            .total_memories_before
            .saturating_sub(self.config.target_memories_per_persona);
        if prune_count == 0 {
            debug!(persona = persona_id, "no pruning needed");
            return Ok(metrics);
        }

        // The percentage ceiling binds before the safety filters.
        let max_deletable =
            (metrics.total_memories_before as f64 * self.config.max_prune_percent).floor() as usize;
        let quota = prune_count.min(max_deletable);

        let mut selected: Vec<(String, f64)> = Vec::with_capacity(quota);
        let mut selected_ids: HashSet<String> = HashSet::with_capacity(quota);
        for (_, memory) in &scored {
            if selected.len() >= quota {
                break;
            }
            if self.is_protected(memory, now) {
                metrics.protected_by_safety += 1;
                continue;
            }
            selected.push((memory.id.clone(), memory.importance));
            selected_ids.insert(memory.id.clone());
        }

        let kept: Vec<f64> = scored
            .iter()
            .filter(|(_, m)| !selected_ids.contains(&m.id))
            .map(|(_, m)| m.importance)
            .collect();
        if !kept.is_empty() {
            metrics.average_importance_kept = kept.iter().sum::<f64>() / kept.len() as f64;
        }

        self.set_phase(persona_id, PruneState::Deleting);
        let mut deleted = 0usize;
        let mut deleted_importance_sum = 0.0;
        let chunks: Vec<&[(String, f64)]> = selected.chunks(self.config.batch_size).collect();
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let ids: Vec<String> = chunk.iter().map(|(id, _)| id.clone()).collect();
            match self.manager.delete(persona_id, &ids).await {
                Ok(n) => {
                    deleted += n;
                    deleted_importance_sum += chunk.iter().map(|(_, imp)| *imp).sum::<f64>();
                }
                Err(e) => {
                    // Committed batches stay deleted; the rest of the run is
                    // abandoned.
                    warn!(persona = persona_id, "delete batch failed, aborting prune: {e}");
                    metrics.errors_encountered += 1;
                    break;
                }
            }
            if i < last {
                tokio::time::sleep(INTERBATCH_PAUSE).await;
            }
        }

        metrics.memories_pruned = deleted;
        metrics.total_memories_after = metrics.total_memories_before - deleted;
        if deleted > 0 {
            metrics.average_importance_pruned = deleted_importance_sum / deleted as f64;
        }
        Ok(metrics)
    }

    /// Dry run: what a prune would do right now.
    pub async fn recommendations(&self, persona_id: &str) -> Result<PruneRecommendation> {
        let now = Utc::now();
        let memories = self.manager.all_memories(persona_id).await?;
        let current = memories.len();
        let target = self.config.target_memories_per_persona;

        if current <= target {
            return Ok(PruneRecommendation {
                needs_pruning: false,
                current_count: current,
                target_count: target,
                would_prune: 0,
                average_importance_to_prune: 0.0,
                importance_range_to_prune: None,
            });
        }

        let mut scored: Vec<(f64, Memory)> = memories
            .into_iter()
            .map(|m| (self.eviction_score(&m, now), m))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        let quota = (current - target).min((current as f64 * self.config.max_prune_percent) as usize);
        let candidates: Vec<f64> = scored
            .iter()
            .filter(|(_, m)| !self.is_protected(m, now))
            .take(quota)
            .map(|(_, m)| m.importance)
            .collect();

        let (average, range) = if candidates.is_empty() {
            (0.0, None)
        } else {
            let sum: f64 = candidates.iter().sum();
            let min = candidates.iter().cloned().fold(f64::MAX, f64::min);
            let max = candidates.iter().cloned().fold(f64::MIN, f64::max);
            (sum / candidates.len() as f64, Some((min, max)))
        };

        Ok(PruneRecommendation {
            needs_pruning: true,
            current_count: current,
            target_count: target,
            would_prune: candidates.len(),
            average_importance_to_prune: average,
            importance_range_to_prune: range,
        })
    }

    pub fn stats(&self) -> PrunerStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        PrunerStats {
            total_operations: state.total_operations,
            total_memories_pruned: state.total_pruned,
            error_count: state.error_count,
            in_progress: state.in_progress.iter().cloned().collect(),
            persona_states: state.phase.clone(),
            last_pruned: state.last_pruned.clone(),
            recent: state.history.back().cloned(),
        }
    }

    // ========================================================================
    // SCORING & SAFETY
    // ========================================================================

    /// Eviction score; lower is pruned sooner.
    fn eviction_score(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        match self.config.strategy {
            PruningStrategy::Lru => memory
                .last_accessed
                .unwrap_or(memory.created_at)
                .timestamp() as f64,
            PruningStrategy::Fifo => memory.created_at.timestamp() as f64,
            strategy => {
                let mut score = memory.importance * self.config.importance_weight;
                if strategy != PruningStrategy::ImportanceOnly {
                    let access = (memory.accessed_count as f64 / 10.0).min(1.0);
                    score += access * self.config.access_weight;
                }
                if strategy == PruningStrategy::ImportanceAccessAge {
                    score += self.age_score(memory.age_days(now)) * self.config.age_weight;
                }
                score
            }
        }
    }

    /// 1.0 for recent memories, 0.1 for ancient ones, linear in between.
    fn age_score(&self, age_days: i64) -> f64 {
        if age_days <= self.config.recent_memory_days {
            1.0
        } else if age_days >= self.config.ancient_memory_days {
            0.1
        } else {
            let range = (self.config.ancient_memory_days - self.config.recent_memory_days) as f64;
            let position = (age_days - self.config.recent_memory_days) as f64;
            1.0 - (position / range) * 0.9
        }
    }

    /// Safety filters, applied after ranking. Any one of these keeps the
    /// memory regardless of its eviction score.
    fn is_protected(&self, memory: &Memory, now: DateTime<Utc>) -> bool {
        if memory.importance >= self.config.max_importance_to_delete {
            return true;
        }
        if memory.accessed_count >= self.config.high_access_threshold {
            return true;
        }
        if let Some(days) = memory.days_since_access(now) {
            if days <= self.config.recent_access_protection_days {
                return true;
            }
        }
        if memory.accessed_count == 0
            && memory.age_days(now) < self.config.zero_access_grace_days
        {
            return true;
        }
        false
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::Embedder;
    use crate::memory::Visibility;
    use chrono::Duration as ChronoDuration;
    use std::collections::{BTreeMap, BTreeSet};

    fn pruner_config() -> PruningConfig {
        PruningConfig::default()
    }

    fn memory(id: &str, importance: f64, accessed: u32, age_days: i64) -> Memory {
        let now = Utc::now();
        Memory {
            id: id.to_string(),
            persona_id: "wizard".to_string(),
            content: format!("memory {id}"),
            importance,
            created_at: now - ChronoDuration::days(age_days),
            last_accessed: None,
            accessed_count: accessed,
            memory_type: "conversation".to_string(),
            visibility: Visibility::Private,
            related_personas: BTreeSet::new(),
            emotional_valence: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    fn standalone() -> MemoryPruner {
        // Scoring and safety logic is pure; build the struct without the
        // async plumbing by reaching through the constructor.
        let directory = Arc::new(crate::directory::MemoryDirectory::new());
        let embedder = Arc::new(crate::embeddings::HashingEmbedder::new());
        let store = Arc::new(crate::vector::VectorStore::new(embedder.dimensions()));
        let manager = crate::memory::manager::MemoryManager::new(
            store,
            embedder,
            &crate::config::MemoryConfig::default(),
            directory,
        );
        let locks = Arc::new(MaintenanceLocks::new());
        MemoryPruner {
            manager,
            locks,
            config: pruner_config(),
            state: StdMutex::new(PrunerState::default()),
        }
    }

    #[tokio::test]
    async fn test_safety_high_importance() {
        let pruner = standalone();
        let now = Utc::now();
        assert!(pruner.is_protected(&memory("m", 0.75, 0, 60), now));
        assert!(!pruner.is_protected(&memory("m", 0.3, 0, 60), now));
    }

    #[tokio::test]
    async fn test_safety_high_access() {
        let pruner = standalone();
        let now = Utc::now();
        assert!(pruner.is_protected(&memory("m", 0.2, 5, 60), now));
        assert!(pruner.is_protected(&memory("m", 0.2, 12, 60), now));
    }

    #[tokio::test]
    async fn test_safety_zero_access_grace() {
        let pruner = standalone();
        let now = Utc::now();
        // Unaccessed but young: protected.
        assert!(pruner.is_protected(&memory("m", 0.2, 0, 10), now));
        // Unaccessed and past the grace window: fair game.
        assert!(!pruner.is_protected(&memory("m", 0.2, 0, 45), now));
    }

    #[tokio::test]
    async fn test_safety_recent_access() {
        let pruner = standalone();
        let now = Utc::now();
        let mut m = memory("m", 0.2, 1, 60);
        m.last_accessed = Some(now - ChronoDuration::days(2));
        assert!(pruner.is_protected(&m, now));

        m.last_accessed = Some(now - ChronoDuration::days(30));
        assert!(!pruner.is_protected(&m, now));
    }

    #[tokio::test]
    async fn test_age_score_interpolation() {
        let pruner = standalone();
        assert_eq!(pruner.age_score(3), 1.0);
        assert_eq!(pruner.age_score(120), 0.1);
        let mid = pruner.age_score(48);
        assert!(mid < 1.0 && mid > 0.1);
    }

    #[tokio::test]
    async fn test_eviction_score_orders_by_value() {
        let pruner = standalone();
        let now = Utc::now();
        let weak = pruner.eviction_score(&memory("a", 0.15, 0, 80), now);
        let strong = pruner.eviction_score(&memory("b", 0.65, 8, 2), now);
        assert!(weak < strong);
    }

    #[tokio::test]
    async fn test_lru_and_fifo_use_timestamps() {
        let mut pruner = standalone();
        let now = Utc::now();

        pruner.config.strategy = PruningStrategy::Fifo;
        let old = pruner.eviction_score(&memory("old", 0.9, 9, 50), now);
        let new = pruner.eviction_score(&memory("new", 0.1, 0, 1), now);
        assert!(old < new);

        pruner.config.strategy = PruningStrategy::Lru;
        let mut touched = memory("touched", 0.1, 1, 50);
        touched.last_accessed = Some(now);
        let untouched = memory("untouched", 0.1, 1, 50);
        assert!(
            pruner.eviction_score(&untouched, now) < pruner.eviction_score(&touched, now)
        );
    }

    #[tokio::test]
    async fn test_concurrent_prune_guard() {
        let pruner = standalone();
        pruner
            .state
            .lock()
            .unwrap()
            .in_progress
            .insert("wizard".to_string());

        let err = pruner.prune_persona("wizard", false).await.unwrap_err();
        assert!(matches!(err, CoreError::PruneInProgress(_)));
    }

    #[tokio::test]
    async fn test_spacing_interval_skips() {
        let pruner = standalone();
        pruner
            .state
            .lock()
            .unwrap()
            .last_pruned
            .insert("wizard".to_string(), Utc::now());

        let metrics = pruner.prune_persona("wizard", false).await.unwrap();
        assert_eq!(metrics.memories_pruned, 0);
        assert_eq!(metrics.total_memories_before, 0);
    }

    #[tokio::test]
    async fn test_empty_collection_is_noop() {
        let pruner = standalone();
        let metrics = pruner.prune_persona("wizard", true).await.unwrap();
        assert_eq!(metrics.memories_pruned, 0);
        assert_eq!(pruner.stats().total_operations, 1);
    }
}
