//! Cross-persona visibility: shared and public memories travel, private
//! memories never leave their owner.

use reverie_e2e_tests::fixtures::engine;
use reverie_core::{MemoryDraft, MemorySource, Visibility};

#[tokio::test]
async fn shared_memory_reaches_related_persona() {
    let e = engine();

    let mut draft = MemoryDraft::new("The tavern serves excellent honey mead on Thursdays");
    draft.memory_type = "local_knowledge".to_string();
    draft.visibility = Visibility::Shared;
    draft.importance = Some(0.7);
    draft.related_personas.insert("kira".to_string());
    e.manager.store("aria", draft, None).await.unwrap();

    let hits = e
        .manager
        .search_cross_persona("kira", "honey mead at the tavern", 5, 0.0, true, false)
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_persona, "aria");
    assert_eq!(hits[0].source, MemorySource::CrossPersona);
    assert_eq!(hits[0].memory.visibility, Visibility::Shared);
}

#[tokio::test]
async fn private_memory_never_crosses_even_with_related_hint() {
    let e = engine();

    // related_personas is informational; it grants nothing.
    let mut draft = MemoryDraft::new("Aria hides her savings under the third floorboard");
    draft.visibility = Visibility::Private;
    draft.related_personas.insert("kira".to_string());
    e.manager.store("aria", draft, None).await.unwrap();

    let cross = e
        .manager
        .search_cross_persona("kira", "where are the savings hidden", 10, 0.0, true, true)
        .await
        .unwrap();
    assert!(cross.is_empty());

    let own = e
        .manager
        .search("kira", "where are the savings hidden", 10, 0.0)
        .await
        .unwrap();
    assert!(own.is_empty());
}

#[tokio::test]
async fn public_memory_honors_include_flag() {
    let e = engine();

    let mut draft = MemoryDraft::new("The old oak tree by the river is a great meeting spot");
    draft.memory_type = "location".to_string();
    draft.visibility = Visibility::Public;
    draft.importance = Some(0.6);
    e.manager.store("aria", draft, None).await.unwrap();

    let with_public = e
        .manager
        .search_cross_persona("kira", "meeting spot by the river", 5, 0.0, false, true)
        .await
        .unwrap();
    assert_eq!(with_public.len(), 1);

    let without_public = e
        .manager
        .search_cross_persona("kira", "meeting spot by the river", 5, 0.0, true, false)
        .await
        .unwrap();
    assert!(without_public.is_empty());
}

#[tokio::test]
async fn requester_sees_own_private_memories_in_cross_search() {
    let e = engine();

    let mut draft = MemoryDraft::new("Kira's own private trail notes about the pass");
    draft.visibility = Visibility::Private;
    e.manager.store("kira", draft, None).await.unwrap();

    let hits = e
        .manager
        .search_cross_persona("kira", "trail notes about the pass", 5, 0.0, true, true)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, MemorySource::Own);
}

#[tokio::test]
async fn no_foreign_private_memory_for_any_requester() {
    let e = engine();

    // A spread of visibilities across two owners.
    for (owner, visibility) in [
        ("aria", Visibility::Private),
        ("aria", Visibility::Shared),
        ("aria", Visibility::Public),
        ("wizard", Visibility::Private),
        ("wizard", Visibility::Public),
    ] {
        let mut draft = MemoryDraft::new(format!(
            "{owner} records a {} note about the harvest festival",
            visibility.as_str()
        ));
        draft.visibility = visibility;
        e.manager.store(owner, draft, None).await.unwrap();
    }

    for requester in ["aria", "kira", "wizard"] {
        let hits = e
            .manager
            .search_cross_persona(requester, "the harvest festival", 50, 0.0, true, true)
            .await
            .unwrap();
        for hit in hits {
            if hit.source_persona != requester {
                assert_ne!(
                    hit.memory.visibility,
                    Visibility::Private,
                    "foreign private memory leaked to {requester}"
                );
            }
        }
    }
}
