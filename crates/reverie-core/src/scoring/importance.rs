//! Importance scorer
//!
//! Blends six bounded signals into one importance value for a fresh memory:
//! content salience, conversation engagement, persona topic match, temporal
//! rarity, relationship compatibility, and a recency placeholder the decay
//! worker later drives downward. The weighted sum is clipped into the
//! configured fresh-write band (default 0.51 - 0.80).

use std::collections::HashSet;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::config::{MemoryConfig, MemoryWeights};
use crate::conversation::ConversationContext;
use crate::memory::MemoryDraft;
use crate::persona::{Persona, Relationship};
use crate::scoring::topic_mentioned;

/// Words that mark emotionally loaded content.
const AFFECT_WORDS: &[&str] = &[
    "emergency", "love", "never", "always", "hate", "death", "dying", "secret",
    "danger", "promise", "betray", "treasure", "forever", "war",
];

/// Filler that marks low-salience chatter.
const FILLER_PHRASES: &[&str] = &[
    "um", "uh", "you know", "i mean", "basically", "sort of", "kind of", "whatever",
];

/// Per-signal breakdown, each in [0.0, 1.0] before weighting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImportanceSignals {
    pub content: f64,
    pub engagement: f64,
    pub persona: f64,
    pub temporal: f64,
    pub relationship: f64,
    pub recency: f64,
}

/// Pure importance scorer. Construct once from config, share freely.
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    weights: MemoryWeights,
    importance_min: f64,
    importance_max: f64,
}

impl ImportanceScorer {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            weights: config.weights,
            importance_min: config.importance_min,
            importance_max: config.importance_max,
        }
    }

    /// Score a draft, returning only the clipped importance.
    pub fn score(
        &self,
        draft: &MemoryDraft,
        persona: &Persona,
        context: Option<&ConversationContext>,
        relationship: Option<&Relationship>,
        previous_store: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> f64 {
        self.score_with_signals(draft, persona, context, relationship, previous_store, now)
            .0
    }

    /// Score a draft, returning the importance and the signal breakdown.
    pub fn score_with_signals(
        &self,
        draft: &MemoryDraft,
        persona: &Persona,
        context: Option<&ConversationContext>,
        relationship: Option<&Relationship>,
        previous_store: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> (f64, ImportanceSignals) {
        let signals = ImportanceSignals {
            content: content_salience(&draft.content),
            engagement: context
                .map(|c| (c.continue_score / 100.0).clamp(0.0, 1.0))
                .unwrap_or(0.5),
            persona: persona_match(&draft.content, persona),
            temporal: temporal_rarity(now, previous_store),
            relationship: relationship
                .map(|r| (r.compatibility_score() + 1.0) / 2.0)
                .unwrap_or(0.5),
            // Recency is always full at creation; the decay worker owns aging.
            recency: 1.0,
        };

        let weighted = self.weights.content * signals.content
            + self.weights.engagement * signals.engagement
            + self.weights.persona * signals.persona
            + self.weights.temporal * signals.temporal
            + self.weights.relationship * signals.relationship
            + self.weights.recency * signals.recency;

        (
            weighted.clamp(self.importance_min, self.importance_max),
            signals,
        )
    }
}

// ============================================================================
// SIGNALS
// ============================================================================

/// Intrinsic salience of the text in [0.0, 1.0].
///
/// Length-normalized vocabulary novelty, boosted by proper nouns, numbers,
/// and affect words, penalized for filler.
fn content_salience(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();

    let unique: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let unique_ratio = unique.len() as f64 / words.len() as f64;
    let length_factor = (words.len() as f64 / 20.0).min(1.0);
    let novelty = unique_ratio * length_factor;

    // Mid-sentence capitalization as a proper-noun proxy; the first word is
    // capitalized by convention and does not count.
    let proper_nouns = words
        .iter()
        .skip(1)
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase) && w.len() > 1)
        .count() as f64;

    let numerics = words
        .iter()
        .filter(|w| w.chars().any(|c| c.is_ascii_digit()))
        .count() as f64;

    let affect = AFFECT_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let filler = FILLER_PHRASES.iter().filter(|p| lower.contains(*p)).count() as f64;

    (novelty + (proper_nouns * 0.05).min(0.2) + (numerics * 0.05).min(0.15)
        + (affect * 0.1).min(0.3)
        - (filler * 0.05).min(0.2))
    .clamp(0.0, 1.0)
}

/// Highest matching topic preference, normalized by 100.
fn persona_match(content: &str, persona: &Persona) -> f64 {
    let lower = content.to_lowercase();
    persona
        .topic_preferences
        .iter()
        .filter(|(topic, _)| topic_mentioned(topic, &lower))
        .map(|(_, interest)| (*interest).min(100) as f64 / 100.0)
        .fold(0.0, f64::max)
}

/// Time-of-creation rarity: off-hours memories stand out, as do memories
/// created far from the previous write cluster.
fn temporal_rarity(now: DateTime<Utc>, previous_store: Option<DateTime<Utc>>) -> f64 {
    let hour = now.hour();
    let base: f64 = if hour < 6 || hour >= 23 {
        1.0
    } else if hour < 8 || hour >= 21 {
        0.6
    } else {
        0.3
    };

    let gap_bonus = previous_store
        .map(|prev| {
            if (now - prev).num_hours() >= 12 {
                0.3
            } else {
                0.0
            }
        })
        .unwrap_or(0.0);

    (base + gap_bonus).min(1.0)
}

// ============================================================================
// TESTS
// ============================================================================
