//! Memory decay
//!
//! Scheduled background aging of memory importance. Each cycle rotates
//! through persona collections (oldest-decayed first), recomputes importance
//! per memory under the configured mode, and pushes changed values back in
//! batches. High-importance and recently-accessed memories are untouchable;
//! everything else drifts down toward the floor, faster when it was never
//! read. Collections that grow past the auto-prune threshold hand off to the
//! pruner.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::memory::manager::MemoryManager;
use crate::memory::pruning::MemoryPruner;
use crate::memory::{MaintenanceLocks, Memory};

/// Pause between update batches so readers are never starved.
const INTERBATCH_PAUSE: Duration = Duration::from_millis(100);

/// Bounded metrics history.
const HISTORY_LIMIT: usize = 50;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How importance ages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    /// No decay at all
    None,
    /// Fixed importance fraction lost per day
    Linear,
    /// Half-life decay
    Exponential,
    /// Slow start, accelerating with age
    Logarithmic,
    /// Gentle exponential, modulated by access patterns
    #[default]
    AccessBased,
}

/// Decay policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub mode: DecayMode,
    /// Hours between background cycles (fractional values are for tests)
    pub decay_interval_hours: f64,
    /// Age at which the base decay factor saturates at 0.8
    pub max_decay_days: i64,
    /// Importance never decays below this
    pub min_importance_floor: f64,
    /// Importance at or above this never decays
    pub protected_importance: f64,
    /// A read within this many days freezes the memory for the cycle
    pub access_protection_days: i64,
    /// Access count that halves access-based decay
    pub high_access_threshold: u32,
    /// Decay multiplier for never-accessed memories (access-based mode)
    pub zero_access_multiplier: f64,
    /// Importance fraction lost per day (linear mode)
    pub linear_rate: f64,
    /// Days to half importance (exponential mode)
    pub half_life_days: f64,
    pub enable_auto_pruning: bool,
    /// Collection size that arms the auto-prune trigger
    pub auto_prune_threshold: usize,
    /// Importance at or below which a memory counts as prunable
    pub auto_prune_importance_threshold: f64,
    /// Prunable memories required before auto-pruning fires
    pub auto_prune_min_candidates: usize,
    /// Personas processed per cycle; the rest wait for the next rotation
    pub max_personas_per_cycle: usize,
    /// Importance updates pushed per batch
    pub max_memories_per_batch: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            mode: DecayMode::default(),
            decay_interval_hours: 6.0,
            max_decay_days: 90,
            min_importance_floor: 0.1,
            protected_importance: 0.8,
            access_protection_days: 7,
            high_access_threshold: 3,
            zero_access_multiplier: 2.0,
            linear_rate: 0.01,
            half_life_days: 30.0,
            enable_auto_pruning: true,
            auto_prune_threshold: 1000,
            auto_prune_importance_threshold: 0.3,
            auto_prune_min_candidates: 50,
            max_personas_per_cycle: 5,
            max_memories_per_batch: 100,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Outcome of one decay cycle (or one persona within it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayMetrics {
    pub personas_processed: usize,
    pub personas_skipped: usize,
    pub memories_processed: usize,
    pub memories_decayed: usize,
    pub average_decay_amount: f64,
    pub auto_prunes_triggered: usize,
    pub errors_encountered: u32,
    pub duration_ms: u64,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate worker statistics for `memory.decay_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct DecayStats {
    pub mode: DecayMode,
    pub interval_hours: f64,
    pub auto_pruning: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub total_cycles: u64,
    pub total_memories_decayed: u64,
    pub total_auto_prunes: u64,
    pub recent: Option<DecayMetrics>,
}

#[derive(Debug, Clone, Default)]
struct PersonaOutcome {
    skipped: bool,
    processed: usize,
    decayed: usize,
    total_decay: f64,
    auto_pruned: bool,
}

#[derive(Default)]
struct DecayState {
    last_run: Option<DateTime<Utc>>,
    persona_last_decayed: HashMap<String, DateTime<Utc>>,
    history: VecDeque<DecayMetrics>,
    total_cycles: u64,
    total_decayed: u64,
    total_auto_prunes: u64,
}

// ============================================================================
// WORKER
// ============================================================================

/// Handle to the running background task. Dropping it does not stop the
/// worker; call [`DecayHandle::stop`] for a clean shutdown (the current
/// batch finishes first).
pub struct DecayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DecayHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("decay worker task ended abnormally: {e}");
        }
    }
}

/// The decay worker. Cycles are never concurrent with themselves, and a
/// persona being pruned is skipped for the cycle.
pub struct DecayWorker {
    manager: Arc<MemoryManager>,
    pruner: Arc<MemoryPruner>,
    locks: Arc<MaintenanceLocks>,
    config: DecayConfig,
    state: StdMutex<DecayState>,
    cycle_guard: tokio::sync::Mutex<()>,
}

impl DecayWorker {
    pub fn new(
        manager: Arc<MemoryManager>,
        pruner: Arc<MemoryPruner>,
        locks: Arc<MaintenanceLocks>,
        config: DecayConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            pruner,
            locks,
            config,
            state: StdMutex::new(DecayState::default()),
            cycle_guard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Spawn the background loop.
    pub fn start(self: &Arc<Self>) -> DecayHandle {
        let (shutdown, rx) = watch::channel(false);
        let worker = Arc::clone(self);
        let task = tokio::spawn(async move { worker.run_loop(rx).await });
        info!(
            interval_hours = self.config.decay_interval_hours,
            mode = ?self.config.mode,
            "started background memory decay"
        );
        DecayHandle { shutdown, task }
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs_f64(self.config.decay_interval_hours * 3600.0);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let metrics = self.run_cycle_inner(Some(&shutdown)).await;
                    info!(
                        personas = metrics.personas_processed,
                        decayed = metrics.memories_decayed,
                        auto_prunes = metrics.auto_prunes_triggered,
                        errors = metrics.errors_encountered,
                        "decay cycle completed"
                    );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("decay worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Run one cycle immediately. Returns empty metrics if a cycle is
    /// already running.
    pub async fn run_cycle(&self) -> DecayMetrics {
        self.run_cycle_inner(None).await
    }

    async fn run_cycle_inner(&self, shutdown: Option<&watch::Receiver<bool>>) -> DecayMetrics {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            warn!("decay cycle already in progress");
            return DecayMetrics::default();
        };
        let started = std::time::Instant::now();
        let mut metrics = DecayMetrics::default();

        let persona_ids = self.select_personas().await;
        debug!(count = persona_ids.len(), "running decay cycle");

        let mut decay_sum = 0.0;
        for persona_id in &persona_ids {
            if stop_requested(shutdown) {
                break;
            }
            match self.decay_persona_inner(persona_id, shutdown).await {
                Ok(outcome) if outcome.skipped => metrics.personas_skipped += 1,
                Ok(outcome) => {
                    metrics.personas_processed += 1;
                    metrics.memories_processed += outcome.processed;
                    metrics.memories_decayed += outcome.decayed;
                    decay_sum += outcome.total_decay;
                    if outcome.auto_pruned {
                        metrics.auto_prunes_triggered += 1;
                    }
                }
                // One failing persona never aborts the cycle.
                Err(e) => {
                    error!(persona = %persona_id, "decay failed: {e}");
                    metrics.errors_encountered += 1;
                }
            }
        }

        if metrics.memories_decayed > 0 {
            metrics.average_decay_amount = decay_sum / metrics.memories_decayed as f64;
        }
        metrics.duration_ms = started.elapsed().as_millis() as u64;
        metrics.finished_at = Some(Utc::now());

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_run = metrics.finished_at;
        state.total_cycles += 1;
        state.total_decayed += metrics.memories_decayed as u64;
        state.total_auto_prunes += metrics.auto_prunes_triggered as u64;
        state.history.push_back(metrics.clone());
        if state.history.len() > HISTORY_LIMIT {
            state.history.pop_front();
        }
        metrics
    }

    /// Rotation: never-decayed personas first, then oldest-decayed, capped
    /// at `max_personas_per_cycle`.
    async fn select_personas(&self) -> Vec<String> {
        let mut persona_ids = self.manager.personas_with_collections().await;
        if persona_ids.len() <= self.config.max_personas_per_cycle {
            persona_ids.sort();
            return persona_ids;
        }
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        persona_ids.sort_by_key(|id| {
            state
                .persona_last_decayed
                .get(id)
                .copied()
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        persona_ids.truncate(self.config.max_personas_per_cycle);
        persona_ids
    }

    /// Decay one persona's collection now.
    pub async fn decay_persona(&self, persona_id: &str) -> Result<DecayMetrics> {
        let outcome = self.decay_persona_inner(persona_id, None).await?;
        let mut metrics = DecayMetrics {
            personas_processed: usize::from(!outcome.skipped),
            personas_skipped: usize::from(outcome.skipped),
            memories_processed: outcome.processed,
            memories_decayed: outcome.decayed,
            auto_prunes_triggered: usize::from(outcome.auto_pruned),
            ..Default::default()
        };
        if outcome.decayed > 0 {
            metrics.average_decay_amount = outcome.total_decay / outcome.decayed as f64;
        }
        Ok(metrics)
    }

    async fn decay_persona_inner(
        &self,
        persona_id: &str,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<PersonaOutcome> {
        let mut outcome = PersonaOutcome::default();

        // Pruner already on this persona: skip it for the cycle.
        if self.pruner.is_pruning(persona_id) {
            debug!(persona = persona_id, "skipping decay, prune in progress");
            outcome.skipped = true;
            return Ok(outcome);
        }

        let memories = self.manager.all_memories(persona_id).await?;
        outcome.processed = memories.len();
        if memories.is_empty() {
            self.mark_decayed(persona_id);
            return Ok(outcome);
        }

        let now = Utc::now();
        let mut new_importance: HashMap<&str, f64> = HashMap::new();
        let mut changed: Vec<(String, f64)> = Vec::new();
        for memory in &memories {
            let updated = self.decayed_importance(memory, now);
            new_importance.insert(memory.id.as_str(), updated);
            if updated != memory.importance {
                outcome.total_decay += memory.importance - updated;
                changed.push((memory.id.clone(), updated));
            }
        }

        let chunks: Vec<&[(String, f64)]> = changed.chunks(self.config.max_memories_per_batch).collect();
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            // Per-batch lock: if the pruner grabbed the persona between
            // batches, leave the remainder for the next cycle.
            let lock = self.locks.for_persona(persona_id);
            let Ok(_guard) = lock.try_lock() else {
                debug!(persona = persona_id, "pruner took the persona mid-cycle, yielding");
                break;
            };
            self.manager.update_importance(persona_id, chunk).await?;
            outcome.decayed += chunk.len();
            drop(_guard);

            if i < last {
                tokio::time::sleep(INTERBATCH_PAUSE).await;
                if stop_requested(shutdown) {
                    break;
                }
            }
        }

        if outcome.decayed > 0 {
            debug!(
                persona = persona_id,
                decayed = outcome.decayed,
                "applied decay batch"
            );
        }

        // Auto-prune hand-off once the collection is both large and soft.
        if self.config.enable_auto_pruning {
            let total = self.manager.count(persona_id).await;
            if total >= self.config.auto_prune_threshold {
                let prunable = memories
                    .iter()
                    .filter(|m| {
                        new_importance
                            .get(m.id.as_str())
                            .copied()
                            .unwrap_or(m.importance)
                            <= self.config.auto_prune_importance_threshold
                    })
                    .count();
                if prunable > self.config.auto_prune_min_candidates {
                    info!(persona = persona_id, total, prunable, "triggering auto-prune");
                    match self.pruner.prune_persona(persona_id, false).await {
                        Ok(_) => outcome.auto_pruned = true,
                        Err(CoreError::PruneInProgress(_)) => {}
                        Err(e) => {
                            warn!(persona = persona_id, "auto-prune failed: {e}");
                        }
                    }
                }
            }
        }

        self.mark_decayed(persona_id);
        Ok(outcome)
    }

    fn mark_decayed(&self, persona_id: &str) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .persona_last_decayed
            .insert(persona_id.to_string(), Utc::now());
    }

    /// Uniform decay with an explicit factor, bypassing mode logic. An
    /// administrative escape hatch; protections do not apply, the floor does.
    pub async fn force_decay(&self, persona_id: &str, factor: f64) -> Result<DecayMetrics> {
        let factor = factor.clamp(0.0, 1.0);
        let memories = self.manager.all_memories(persona_id).await?;
        let mut changed = Vec::new();
        for memory in &memories {
            if memory.importance > self.config.min_importance_floor {
                let updated = round3(
                    (memory.importance * (1.0 - factor)).max(self.config.min_importance_floor),
                );
                if updated != memory.importance {
                    changed.push((memory.id.clone(), updated));
                }
            }
        }
        let decayed = if changed.is_empty() {
            0
        } else {
            self.manager.update_importance(persona_id, &changed).await?
        };
        info!(persona = persona_id, decayed, factor, "force decay applied");
        Ok(DecayMetrics {
            personas_processed: 1,
            memories_processed: memories.len(),
            memories_decayed: decayed,
            average_decay_amount: if decayed > 0 { factor } else { 0.0 },
            finished_at: Some(Utc::now()),
            ..Default::default()
        })
    }

    pub fn stats(&self) -> DecayStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        DecayStats {
            mode: self.config.mode,
            interval_hours: self.config.decay_interval_hours,
            auto_pruning: self.config.enable_auto_pruning,
            last_run: state.last_run,
            total_cycles: state.total_cycles,
            total_memories_decayed: state.total_decayed,
            total_auto_prunes: state.total_auto_prunes,
            recent: state.history.back().cloned(),
        }
    }

    // ========================================================================
    // DECAY MATH
    // ========================================================================

    /// New importance for one memory at `now`. Pure.
    pub fn decayed_importance(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        if self.config.mode == DecayMode::None {
            return memory.importance;
        }
        // Unconditional protections come before any factor.
        if memory.importance >= self.config.protected_importance {
            return memory.importance;
        }
        if let Some(days) = memory.days_since_access(now) {
            if days <= self.config.access_protection_days {
                return memory.importance;
            }
        }

        let age_days = memory.age_days(now);
        let mut factor = self.decay_factor(age_days);
        if self.config.mode == DecayMode::AccessBased {
            if memory.accessed_count == 0 {
                factor *= self.config.zero_access_multiplier;
            } else if memory.accessed_count >= self.config.high_access_threshold {
                factor *= 0.5;
            }
        }

        let decayed = memory.importance * (1.0 - factor);
        round3(decayed.max(self.config.min_importance_floor))
    }

    /// Base decay factor from age alone.
    fn decay_factor(&self, age_days: i64) -> f64 {
        if age_days <= 0 {
            return 0.0;
        }
        if age_days >= self.config.max_decay_days {
            return 0.8;
        }
        let age = age_days as f64;
        match self.config.mode {
            DecayMode::None => 0.0,
            DecayMode::Linear => (age * self.config.linear_rate).min(0.8),
            DecayMode::Exponential => 1.0 - 0.5f64.powf(age / self.config.half_life_days),
            DecayMode::Logarithmic => {
                ((1.0 + age).ln() / (1.0 + self.config.max_decay_days as f64).ln()).min(0.8)
            }
            DecayMode::AccessBased => (1.0 - 0.7f64.powf(age / 30.0)).min(0.6),
        }
    }
}

fn stop_requested(shutdown: Option<&watch::Receiver<bool>>) -> bool {
    shutdown.is_some_and(|rx| *rx.borrow())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ============================================================================
// TESTS
// ============================================================================
