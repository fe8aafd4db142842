//! Importance scoring through the full store path.

use reverie_e2e_tests::fixtures::engine;
use reverie_core::MemoryDraft;

#[tokio::test]
async fn spellbook_memory_scores_in_expected_band() {
    // Default weights {content 0.3, engagement 0.2, persona 0.15,
    // temporal 0.05, relationship 0.1, recency 0.2}; aria has magic=80.
    let e = engine();

    let mut draft = MemoryDraft::new("The ancient spellbook of Thalos glows at midnight");
    draft.memory_type = "local_knowledge".to_string();
    let id = e.manager.store("aria", draft, None).await.unwrap();

    let memory = e.store.get("aria", &id).await.unwrap();
    assert!(
        (0.55..=0.80).contains(&memory.importance),
        "importance {} outside [0.55, 0.80]",
        memory.importance
    );
}

#[tokio::test]
async fn scored_writes_stay_inside_fresh_band() {
    let e = engine();
    let samples = [
        "hm",
        "um you know it was basically fine i guess",
        "Emergency! Captain Maro counted 300 riders at the North Gate, never seen before",
        "a quiet uneventful morning in the market",
    ];
    for content in samples {
        let id = e
            .manager
            .store("kira", MemoryDraft::new(content), None)
            .await
            .unwrap();
        let memory = e.store.get("kira", &id).await.unwrap();
        assert!(
            (0.51..=0.80).contains(&memory.importance),
            "{content:?} -> {}",
            memory.importance
        );
    }
}

#[tokio::test]
async fn topic_alignment_beats_indifference() {
    let e = engine();
    let content = "A sealed scroll case holds an enchanted rune of binding";

    let for_wizard = e
        .manager
        .store("wizard", MemoryDraft::new(content), None)
        .await
        .unwrap();
    let for_kira = e
        .manager
        .store("kira", MemoryDraft::new(content), None)
        .await
        .unwrap();

    let wizard_memory = e.store.get("wizard", &for_wizard).await.unwrap();
    let kira_memory = e.store.get("kira", &for_kira).await.unwrap();
    assert!(
        wizard_memory.importance > kira_memory.importance,
        "wizard (magic 95) should retain magical lore harder than kira"
    );
}

#[tokio::test]
async fn explicit_importance_override_is_respected() {
    let e = engine();
    let mut draft = MemoryDraft::new("a note pinned above the importance ceiling");
    draft.importance = Some(0.95);
    let id = e.manager.store("aria", draft, None).await.unwrap();

    let memory = e.store.get("aria", &id).await.unwrap();
    assert_eq!(memory.importance, 0.95);
}
