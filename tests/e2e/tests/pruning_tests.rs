//! Pruning over large seeded collections: safety rules, the eviction cap,
//! and the soft target.

use std::collections::HashMap;

use reverie_e2e_tests::fixtures::{engine_with, seed_raw};
use reverie_core::{Memory, RuntimeConfig};

fn pruning_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.pruning.target_memories_per_persona = 800;
    config.pruning.pruning_threshold = 900;
    config.pruning.max_importance_to_delete = 0.7;
    config
}

async fn snapshot(e: &reverie_e2e_tests::fixtures::TestEngine, persona: &str) -> HashMap<String, Memory> {
    e.manager
        .all_memories(persona)
        .await
        .unwrap()
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect()
}

#[tokio::test]
async fn prune_of_overgrown_collection_respects_every_guarantee() {
    let e = engine_with(pruning_config());

    // 1200 memories, importance spread over [0.1, 0.9], ages 40-130 days,
    // access counts cycling 0-7.
    seed_raw(
        &e,
        "wizard",
        1200,
        |i| 0.1 + 0.8 * (i as f64 / 1199.0),
        |i| 40 + (i as i64 % 91),
        |i| (i % 8) as u32,
    )
    .await;

    let before = snapshot(&e, "wizard").await;
    assert_eq!(before.len(), 1200);

    let metrics = e.pruner.prune_persona("wizard", false).await.unwrap();
    let after = snapshot(&e, "wizard").await;

    // Soft target with a hard cap: 1200 - target caps at 25% of 1200.
    assert!(metrics.memories_pruned > 0);
    assert!(after.len() <= 1000, "remaining {}", after.len());
    assert_eq!(after.len(), 1200 - metrics.memories_pruned);
    assert!(
        metrics.memories_pruned as f64 <= 1200.0 * 0.25,
        "bounded eviction violated: {}",
        metrics.memories_pruned
    );

    // Every deleted memory was safe to delete.
    for (id, memory) in &before {
        if !after.contains_key(id) {
            assert!(memory.importance < 0.7, "deleted importance {}", memory.importance);
            assert!(memory.accessed_count < 5, "deleted access count {}", memory.accessed_count);
            assert!(
                memory.accessed_count > 0 || memory.age_days(chrono::Utc::now()) >= 30,
                "deleted a grace-period memory"
            );
        }
    }

    // What remains should on average outrank what was removed.
    assert!(metrics.average_importance_kept > metrics.average_importance_pruned);
}

#[tokio::test]
async fn safety_rules_keep_collection_above_target_when_needed() {
    let mut config = pruning_config();
    config.pruning.target_memories_per_persona = 10;
    let e = engine_with(config);

    // Every memory is protected: high importance or heavy access.
    seed_raw(
        &e,
        "wizard",
        100,
        |i| if i % 2 == 0 { 0.85 } else { 0.4 },
        |_| 60,
        |i| if i % 2 == 0 { 0 } else { 9 },
    )
    .await;

    let metrics = e.pruner.prune_persona("wizard", true).await.unwrap();
    assert_eq!(metrics.memories_pruned, 0);
    assert_eq!(metrics.protected_by_safety, 100);
    assert_eq!(e.manager.count("wizard").await, 100);
}

#[tokio::test]
async fn second_prune_within_spacing_interval_is_a_noop() {
    let e = engine_with(pruning_config());
    seed_raw(&e, "wizard", 950, |i| 0.1 + 0.5 * (i as f64 / 949.0), |_| 60, |_| 1).await;

    let first = e.pruner.prune_persona("wizard", false).await.unwrap();
    assert!(first.memories_pruned > 0);

    let second = e.pruner.prune_persona("wizard", false).await.unwrap();
    assert_eq!(second.memories_pruned, 0);
    assert_eq!(second.total_memories_before, 0);

    // Force bypasses the spacing guard.
    let forced = e.pruner.prune_persona("wizard", true).await.unwrap();
    assert!(forced.total_memories_before > 0);
}

#[tokio::test]
async fn recommendations_match_a_subsequent_prune() {
    let e = engine_with(pruning_config());
    seed_raw(&e, "wizard", 1000, |i| 0.1 + 0.6 * (i as f64 / 999.0), |_| 50, |_| 1).await;

    let recommendation = e.pruner.recommendations("wizard").await.unwrap();
    assert!(recommendation.needs_pruning);
    assert_eq!(recommendation.current_count, 1000);
    assert_eq!(recommendation.target_count, 800);
    assert!(recommendation.would_prune > 0);

    let metrics = e.pruner.prune_persona("wizard", false).await.unwrap();
    assert_eq!(metrics.memories_pruned, recommendation.would_prune);
}

#[tokio::test]
async fn under_threshold_collection_reports_no_pruning_needed() {
    let e = engine_with(pruning_config());
    seed_raw(&e, "wizard", 50, |_| 0.3, |_| 60, |_| 1).await;

    assert!(!e.pruner.should_prune("wizard").await);
    let recommendation = e.pruner.recommendations("wizard").await.unwrap();
    assert!(!recommendation.needs_pruning);
}
