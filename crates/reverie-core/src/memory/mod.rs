//! Memory model and engine
//!
//! A memory is a content-addressed record owned by exactly one persona,
//! retrievable by semantic similarity. Importance drives retention: the
//! scorer bounds it at creation, the decay worker reduces it over time, and
//! the pruner evicts the lowest-ranked safe subset when a collection grows
//! past its threshold.

pub mod decay;
pub mod manager;
pub mod pruning;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// VISIBILITY
// ============================================================================

/// Access tag on a memory.
///
/// `private` memories must never be returned to any persona other than their
/// owner; `related_personas` is informational and does not grant access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Owner only
    #[default]
    Private,
    /// Owner plus cross-persona searches that request shared results
    Shared,
    /// Any persona
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Shared => "shared",
            Visibility::Public => "public",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// One memory record.
///
/// Ids are opaque and never reused. Importance stays in [0.0, 1.0] and is
/// non-increasing under decay; only an explicit access or rescoring raises
/// the retention signals again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub persona_id: String,
    pub content: String,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub accessed_count: u32,
    /// Free-form kind tag: conversation, location, local_knowledge, ...
    pub memory_type: String,
    pub visibility: Visibility,
    /// Personas this memory mentions. Informational only.
    #[serde(default)]
    pub related_personas: BTreeSet<String>,
    /// -1.0 (negative) .. 1.0 (positive)
    pub emotional_valence: f64,
    /// Extensional key/value metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Memory {
    /// Whole days since creation (negative ages clamp to zero).
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }

    /// Whole days since the last access, if the memory was ever accessed.
    pub fn days_since_access(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_accessed.map(|at| (now - at).num_days().max(0))
    }

    /// Record a read: bumps the access counter and timestamp.
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.accessed_count += 1;
        self.last_accessed = Some(now);
    }
}

// ============================================================================
// DRAFTS & RESULTS
// ============================================================================

/// Input for creating a memory, before scoring and embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDraft {
    pub content: String,
    #[serde(default = "default_memory_type")]
    pub memory_type: String,
    #[serde(default)]
    pub visibility: Visibility,
    /// Explicit importance override in [0.0, 1.0]; skips the scorer.
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub related_personas: BTreeSet<String>,
    #[serde(default)]
    pub emotional_valence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_memory_type() -> String {
    "conversation".to_string()
}

impl MemoryDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            memory_type: default_memory_type(),
            visibility: Visibility::default(),
            importance: None,
            related_personas: BTreeSet::new(),
            emotional_valence: 0.0,
            metadata: BTreeMap::new(),
        }
    }
}

/// Where a retrieved memory came from relative to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    Own,
    CrossPersona,
}

/// A search hit: the memory plus ranking and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    #[serde(flatten)]
    pub memory: Memory,
    pub similarity: f32,
    pub source_persona: String,
    pub source: MemorySource,
}

/// Aggregate statistics for one persona's collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub memory_types: BTreeMap<String, usize>,
    pub by_visibility: BTreeMap<String, usize>,
    pub average_importance: f64,
}

// ============================================================================
// MAINTENANCE COORDINATION
// ============================================================================

/// Keyed per-persona locks keeping the decay worker and the pruner off the
/// same collection at the same time.
///
/// The pruner holds a persona's lock for a whole invocation; the decay
/// worker acquires it per batch and walks away from the persona when the
/// lock is contended.
#[derive(Default)]
pub struct MaintenanceLocks {
    inner: Mutex<HashMap<String, std::sync::Arc<tokio::sync::Mutex<()>>>>,
}

impl MaintenanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for one persona, created on first use.
    pub fn for_persona(&self, persona_id: &str) -> std::sync::Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(persona_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_memory_age() {
        let now = Utc::now();
        let memory = Memory {
            id: "m1".into(),
            persona_id: "aria".into(),
            content: "test".into(),
            importance: 0.5,
            created_at: now - Duration::days(10),
            last_accessed: Some(now - Duration::days(2)),
            accessed_count: 1,
            memory_type: "conversation".into(),
            visibility: Visibility::Private,
            related_personas: BTreeSet::new(),
            emotional_valence: 0.0,
            metadata: BTreeMap::new(),
        };

        assert_eq!(memory.age_days(now), 10);
        assert_eq!(memory.days_since_access(now), Some(2));
    }

    #[test]
    fn test_record_access() {
        let now = Utc::now();
        let mut memory = Memory {
            id: "m1".into(),
            persona_id: "aria".into(),
            content: "test".into(),
            importance: 0.5,
            created_at: now,
            last_accessed: None,
            accessed_count: 0,
            memory_type: "conversation".into(),
            visibility: Visibility::Private,
            related_personas: BTreeSet::new(),
            emotional_valence: 0.0,
            metadata: BTreeMap::new(),
        };

        memory.record_access(now);
        assert_eq!(memory.accessed_count, 1);
        assert_eq!(memory.last_accessed, Some(now));
    }

    #[test]
    fn test_visibility_wire_format() {
        assert_eq!(serde_json::to_string(&Visibility::Shared).unwrap(), "\"shared\"");
        assert_eq!(
            serde_json::from_str::<Visibility>("\"public\"").unwrap(),
            Visibility::Public
        );
    }

    #[test]
    fn test_draft_defaults() {
        let draft: MemoryDraft = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(draft.memory_type, "conversation");
        assert_eq!(draft.visibility, Visibility::Private);
        assert!(draft.importance.is_none());
    }
}
