//! Shared fixtures: a fully wired engine over an in-memory directory and
//! the deterministic hashing embedder, plus helpers for backdating records.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, Utc};

use reverie_core::{
    DecayWorker, Embedder, HashingEmbedder, MaintenanceLocks, Memory, MemoryDirectory,
    MemoryManager, MemoryPruner, Persona, PersonaDirectory, Relationship, RuntimeConfig,
    VectorStore, Visibility,
};

pub struct TestEngine {
    pub directory: Arc<MemoryDirectory>,
    pub embedder: Arc<HashingEmbedder>,
    pub store: Arc<VectorStore>,
    pub manager: Arc<MemoryManager>,
    pub locks: Arc<MaintenanceLocks>,
    pub pruner: Arc<MemoryPruner>,
    pub decay: Arc<DecayWorker>,
}

/// aria (bard), kira (ranger), wizard (noble scholar of magic).
pub fn default_personas() -> Vec<Persona> {
    let mut aria = Persona::new("aria", "Aria", "a warm tavern bard who collects stories");
    aria.topic_preferences
        .extend([("magic".to_string(), 80), ("stories".to_string(), 70)]);

    let mut kira = Persona::new("kira", "Kira", "a terse ranger who knows every road");
    kira.topic_preferences
        .extend([("travel".to_string(), 85), ("local_news".to_string(), 55)]);

    let mut wizard = Persona::new("wizard", "Thalos", "an archmage with a crowded tower");
    wizard.topic_preferences.insert("magic".to_string(), 95);
    wizard.social_rank = "nobility".to_string();

    vec![aria, kira, wizard]
}

pub fn engine() -> TestEngine {
    engine_with(RuntimeConfig::default())
}

pub fn engine_with(config: RuntimeConfig) -> TestEngine {
    let directory = Arc::new(MemoryDirectory::with_personas(default_personas()));
    let mut relationship = Relationship::new("aria", "kira");
    relationship.affinity = 0.3;
    relationship.trust = 0.2;
    relationship.respect = 0.25;
    directory.upsert_relationship(&relationship).unwrap();

    let embedder = Arc::new(HashingEmbedder::new());
    let store = Arc::new(VectorStore::new(embedder.dimensions()));
    let manager = MemoryManager::new(
        Arc::clone(&store),
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        &config.memory,
        Arc::clone(&directory) as Arc<dyn PersonaDirectory>,
    );
    let locks = Arc::new(MaintenanceLocks::new());
    let pruner = MemoryPruner::new(
        Arc::clone(&manager),
        Arc::clone(&locks),
        config.pruning.clone(),
    );
    let decay = DecayWorker::new(
        Arc::clone(&manager),
        Arc::clone(&pruner),
        Arc::clone(&locks),
        config.decay.clone(),
    );

    TestEngine {
        directory,
        embedder,
        store,
        manager,
        locks,
        pruner,
        decay,
    }
}

/// Rewrite a stored memory's age and access metadata in place.
pub async fn backdate(
    engine: &TestEngine,
    persona_id: &str,
    memory_id: &str,
    age_days: i64,
    accessed_count: u32,
    last_accessed_days_ago: Option<i64>,
) {
    let now = Utc::now();
    let mut memory = engine
        .store
        .get(persona_id, memory_id)
        .await
        .expect("memory exists");
    memory.created_at = now - Duration::days(age_days);
    memory.accessed_count = accessed_count;
    memory.last_accessed = last_accessed_days_ago.map(|d| now - Duration::days(d));
    engine
        .store
        .batch_update_metadata(persona_id, &[memory_id.to_string()], &[memory])
        .await
        .expect("backdate update");
}

/// Seed a collection directly (bypassing the scorer) with full control over
/// importance, age, and access counts.
pub async fn seed_raw(
    engine: &TestEngine,
    persona_id: &str,
    count: usize,
    importance: impl Fn(usize) -> f64,
    age_days: impl Fn(usize) -> i64,
    accessed: impl Fn(usize) -> u32,
) -> Vec<String> {
    engine.store.ensure_collection(persona_id).await;
    let now = Utc::now();
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let content = format!("seeded memory {i} about entry {}", i % 17);
        let vector = engine.embedder.embed(&content).unwrap();
        let memory = Memory {
            id: format!("seed-{i}"),
            persona_id: persona_id.to_string(),
            content,
            importance: importance(i),
            created_at: now - Duration::days(age_days(i)),
            last_accessed: None,
            accessed_count: accessed(i),
            memory_type: "conversation".to_string(),
            visibility: Visibility::Private,
            related_personas: BTreeSet::new(),
            emotional_valence: 0.0,
            metadata: BTreeMap::new(),
        };
        let id = memory.id.clone();
        engine
            .store
            .upsert(persona_id, &id, vector, memory)
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}
