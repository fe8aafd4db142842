//! Decay worker behavior over real collections.

use reverie_e2e_tests::fixtures::{backdate, engine_with};
use reverie_core::{DecayMode, MemoryDraft, RuntimeConfig};

fn config(mode: DecayMode) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.decay.mode = mode;
    config
}

#[tokio::test]
async fn exponential_half_life_after_thirty_days() {
    let mut cfg = config(DecayMode::Exponential);
    cfg.decay.half_life_days = 30.0;
    let e = engine_with(cfg);

    let mut draft = MemoryDraft::new("a fading recollection of the spring fair");
    draft.importance = Some(0.6);
    let id = e.manager.store("aria", draft, None).await.unwrap();
    backdate(&e, "aria", &id, 30, 1, None).await;

    let metrics = e.decay.run_cycle().await;
    assert_eq!(metrics.memories_decayed, 1);

    let memory = e.store.get("aria", &id).await.unwrap();
    assert!(
        (memory.importance - 0.30).abs() <= 0.02,
        "expected ~0.30, got {}",
        memory.importance
    );
}

#[tokio::test]
async fn protected_importance_is_idempotent_under_decay() {
    let e = engine_with(config(DecayMode::Exponential));

    let mut draft = MemoryDraft::new("the day the tower burned, never to be forgotten");
    draft.importance = Some(0.9);
    let id = e.manager.store("aria", draft, None).await.unwrap();
    backdate(&e, "aria", &id, 120, 0, None).await;

    for _ in 0..3 {
        e.decay.run_cycle().await;
    }
    assert_eq!(e.store.get("aria", &id).await.unwrap().importance, 0.9);
}

#[tokio::test]
async fn recently_accessed_memory_is_untouched() {
    let e = engine_with(config(DecayMode::Exponential));

    let mut draft = MemoryDraft::new("a favorite story retold last night");
    draft.importance = Some(0.5);
    let id = e.manager.store("aria", draft, None).await.unwrap();
    backdate(&e, "aria", &id, 60, 3, Some(2)).await;

    e.decay.run_cycle().await;
    assert_eq!(e.store.get("aria", &id).await.unwrap().importance, 0.5);
}

#[tokio::test]
async fn fresh_memory_is_unchanged_in_every_mode() {
    for mode in [
        DecayMode::Linear,
        DecayMode::Exponential,
        DecayMode::Logarithmic,
        DecayMode::AccessBased,
    ] {
        let e = engine_with(config(mode));
        let mut draft = MemoryDraft::new("a memory created just now");
        draft.importance = Some(0.6);
        let id = e.manager.store("aria", draft, None).await.unwrap();

        e.decay.run_cycle().await;
        assert_eq!(
            e.store.get("aria", &id).await.unwrap().importance,
            0.6,
            "{mode:?}"
        );
    }
}

#[tokio::test]
async fn decay_is_monotonic_and_floored_across_cycles() {
    let e = engine_with(config(DecayMode::AccessBased));

    let mut draft = MemoryDraft::new("an unread note slowly losing its grip");
    draft.importance = Some(0.6);
    let id = e.manager.store("aria", draft, None).await.unwrap();
    backdate(&e, "aria", &id, 50, 0, None).await;

    let mut previous = 0.6;
    for _ in 0..5 {
        e.decay.run_cycle().await;
        let importance = e.store.get("aria", &id).await.unwrap().importance;
        assert!(importance <= previous, "importance rose: {previous} -> {importance}");
        assert!(importance >= 0.1, "importance fell through the floor");
        previous = importance;
    }
}

#[tokio::test]
async fn decay_yields_persona_while_pruner_holds_it() {
    let e = engine_with(config(DecayMode::Exponential));

    let mut draft = MemoryDraft::new("a memory the worker should not touch yet");
    draft.importance = Some(0.5);
    let id = e.manager.store("aria", draft, None).await.unwrap();
    backdate(&e, "aria", &id, 60, 1, None).await;

    // Simulate the pruner holding aria's maintenance lock mid-invocation.
    let lock = e.locks.for_persona("aria");
    let guard = lock.lock().await;
    let metrics = e.decay.run_cycle().await;
    assert_eq!(metrics.memories_decayed, 0);
    assert_eq!(e.store.get("aria", &id).await.unwrap().importance, 0.5);
    drop(guard);

    // Next cycle proceeds normally.
    let metrics = e.decay.run_cycle().await;
    assert_eq!(metrics.memories_decayed, 1);
}

#[tokio::test]
async fn force_decay_applies_uniform_factor() {
    let e = engine_with(config(DecayMode::None));

    let mut draft = MemoryDraft::new("subject to administrative decay");
    draft.importance = Some(0.8);
    let id = e.manager.store("aria", draft, None).await.unwrap();

    let metrics = e.decay.force_decay("aria", 0.25).await.unwrap();
    assert_eq!(metrics.memories_decayed, 1);
    assert_eq!(e.store.get("aria", &id).await.unwrap().importance, 0.6);
}
