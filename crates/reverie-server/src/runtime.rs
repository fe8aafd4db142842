//! Shared runtime state
//!
//! One [`AppRuntime`] per process, shared by every WebSocket session. The
//! only cross-session mutable state is the persona interaction map and the
//! process counters; memory collections are owned by the engine.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};

use reverie_core::{
    ConversationScorer, DecayWorker, InteractionState, MemoryManager, MemoryPruner,
    PersonaDirectory, RuntimeConfig,
};

use crate::llm::ChatProvider;

/// Process-wide shared state.
pub struct AppRuntime {
    pub config: RuntimeConfig,
    pub directory: Arc<dyn PersonaDirectory>,
    pub manager: Arc<MemoryManager>,
    pub decay: Arc<DecayWorker>,
    pub pruner: Arc<MemoryPruner>,
    pub provider: Arc<dyn ChatProvider>,
    pub scorer: ConversationScorer,
    interactions: Mutex<HashMap<String, InteractionState>>,
    pub started_at: Instant,
    pub requests_handled: AtomicU64,
    pub sessions_open: AtomicU64,
}

impl AppRuntime {
    pub fn new(
        config: RuntimeConfig,
        directory: Arc<dyn PersonaDirectory>,
        manager: Arc<MemoryManager>,
        decay: Arc<DecayWorker>,
        pruner: Arc<MemoryPruner>,
        provider: Arc<dyn ChatProvider>,
    ) -> Arc<Self> {
        let scorer = ConversationScorer::new(config.conversation.clone(), config.persona.clone());
        Arc::new(Self {
            config,
            directory,
            manager,
            decay,
            pruner,
            provider,
            scorer,
            interactions: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
            requests_handled: AtomicU64::new(0),
            sessions_open: AtomicU64::new(0),
        })
    }

    /// Snapshot of a persona's interaction state, created on first use with
    /// the configured defaults.
    pub fn interaction(&self, persona_id: &str) -> InteractionState {
        let mut map = self.interactions.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(persona_id.to_string())
            .or_insert_with(|| self.fresh_interaction(persona_id))
            .clone()
    }

    /// Mutate a persona's interaction state in place.
    pub fn update_interaction(&self, persona_id: &str, apply: impl FnOnce(&mut InteractionState)) {
        let mut map = self.interactions.lock().unwrap_or_else(|e| e.into_inner());
        let state = map
            .entry(persona_id.to_string())
            .or_insert_with(|| self.fresh_interaction(persona_id));
        apply(state);
    }

    fn fresh_interaction(&self, persona_id: &str) -> InteractionState {
        let mut state = InteractionState::new(persona_id);
        state.social_energy = self.config.persona.default_social_energy;
        state.available_time = self.config.persona.default_available_time_secs;
        state
    }

    /// Human-readable availability tag for listings.
    pub fn persona_status(&self, state: &InteractionState, now: DateTime<Utc>) -> &'static str {
        if state.cooldown_until.is_some_and(|until| until > now) {
            "cooling_down"
        } else if state.social_energy < self.config.persona.low_social_energy {
            "exhausted"
        } else {
            "available"
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
