//! Store/search workflows: ordering, round trips, stats, and access
//! tracking end to end.

use std::time::Duration;

use reverie_e2e_tests::fixtures::engine;
use reverie_core::MemoryDraft;

#[tokio::test]
async fn stats_after_ten_stores() {
    let e = engine();

    for i in 0..6 {
        let mut draft = MemoryDraft::new(format!("an evening chat about the weather, day {i}"));
        draft.memory_type = "conversation".to_string();
        e.manager.store("aria", draft, None).await.unwrap();
    }
    for i in 0..3 {
        let mut draft = MemoryDraft::new(format!("landmark number {i} along the river"));
        draft.memory_type = "location".to_string();
        e.manager.store("aria", draft, None).await.unwrap();
    }
    let mut draft = MemoryDraft::new("the miller pays double for early grain");
    draft.memory_type = "local_knowledge".to_string();
    e.manager.store("aria", draft, None).await.unwrap();

    let stats = e.manager.stats("aria").await.unwrap();
    assert_eq!(stats.total_memories, 10);
    assert_eq!(stats.memory_types.get("conversation"), Some(&6));
    assert_eq!(stats.memory_types.get("location"), Some(&3));
    assert_eq!(stats.memory_types.get("local_knowledge"), Some(&1));
    assert!(stats.average_importance > 0.0);
}

#[tokio::test]
async fn search_after_store_observes_the_new_memory() {
    let e = engine();

    let id = e
        .manager
        .store(
            "kira",
            MemoryDraft::new("a rockslide closed the high pass this morning"),
            None,
        )
        .await
        .unwrap();

    // No settling delay: write visibility is immediate after store returns.
    let hits = e
        .manager
        .search("kira", "rockslide closed the high pass", 5, 0.0)
        .await
        .unwrap();
    assert!(hits.iter().any(|h| h.memory.id == id));
}

#[tokio::test]
async fn identical_content_ranks_first() {
    let e = engine();

    let needle = "the ferryman hums the same three notes every crossing";
    let id = e
        .manager
        .store("aria", MemoryDraft::new(needle), None)
        .await
        .unwrap();
    for filler in [
        "the baker burned the rye again",
        "two carts collided by the well",
        "a stranger asked about the old mill",
    ] {
        e.manager
            .store("aria", MemoryDraft::new(filler), None)
            .await
            .unwrap();
    }

    let hits = e.manager.search("aria", needle, 4, 0.0).await.unwrap();
    assert_eq!(hits[0].memory.id, id);
    assert!(hits[0].similarity > hits[1].similarity);
}

#[tokio::test]
async fn empty_query_returns_collection_filtered_by_importance() {
    let e = engine();

    for (i, importance) in [0.2, 0.4, 0.6, 0.8].iter().enumerate() {
        let mut draft = MemoryDraft::new(format!("note {i}"));
        draft.importance = Some(*importance);
        e.manager.store("aria", draft, None).await.unwrap();
    }

    let all = e.manager.search("aria", "", 0, 0.0).await.unwrap();
    assert_eq!(all.len(), 4);

    let strong = e.manager.search("aria", "", 0, 0.5).await.unwrap();
    assert_eq!(strong.len(), 2);
    assert!(strong.iter().all(|h| h.memory.importance >= 0.5));
}

#[tokio::test]
async fn reads_bump_access_counters_within_a_second() {
    let e = engine();

    let id = e
        .manager
        .store("aria", MemoryDraft::new("a memory that gets revisited"), None)
        .await
        .unwrap();

    for _ in 0..3 {
        e.manager
            .search("aria", "a memory that gets revisited", 1, 0.0)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(900)).await;

    let memory = e.store.get("aria", &id).await.unwrap();
    assert_eq!(memory.accessed_count, 3);
    assert!(memory.last_accessed.is_some());
}

#[tokio::test]
async fn ties_break_by_importance_then_recency() {
    let e = engine();

    // Same content twice: identical similarity, different importance.
    let mut low = MemoryDraft::new("the same remembered phrase");
    low.importance = Some(0.55);
    let low_id = e.manager.store("aria", low, None).await.unwrap();

    let mut high = MemoryDraft::new("the same remembered phrase");
    high.importance = Some(0.75);
    let high_id = e.manager.store("aria", high, None).await.unwrap();

    let hits = e
        .manager
        .search("aria", "the same remembered phrase", 2, 0.0)
        .await
        .unwrap();
    assert_eq!(hits[0].memory.id, high_id);
    assert_eq!(hits[1].memory.id, low_id);
}
