//! Persona model - read-only handles the memory engine scores against
//!
//! Personas themselves live in the registry (see [`crate::directory`]); the
//! core only reads traits, topic preferences, and social rank. The
//! per-persona [`InteractionState`] is session-scoped and never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A conversational persona.
///
/// The engine treats personas as read-only: traits and preferences feed the
/// importance and conversation scorers, the social rank feeds the status
/// bonus. Lifecycle (creation, editing) happens outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identifier (lowercased short name in practice)
    pub id: String,
    /// Display name
    pub name: String,
    /// Short description shown to clients
    pub description: String,
    /// Named numeric personality scales (charisma, intelligence, ...)
    #[serde(default)]
    pub personality_traits: HashMap<String, f64>,
    /// Topic -> interest, 0-100
    #[serde(default)]
    pub topic_preferences: HashMap<String, u32>,
    /// Ordinal rank from the status hierarchy (peasant .. royalty)
    #[serde(default = "default_social_rank")]
    pub social_rank: String,
}

fn default_social_rank() -> String {
    "commoner".to_string()
}

impl Persona {
    /// Create a persona with an explicit id and empty preference maps.
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            personality_traits: HashMap::new(),
            topic_preferences: HashMap::new(),
            social_rank: default_social_rank(),
        }
    }

    /// Interest in a topic, 0-100. Unknown topics score 0.
    pub fn interest_in(&self, topic: &str) -> u32 {
        self.topic_preferences.get(topic).copied().unwrap_or(0)
    }
}

// ============================================================================
// INTERACTION STATE
// ============================================================================

/// Session-scoped social resources for a persona.
///
/// Maintained in memory by the session orchestrator; the scorers read it but
/// never mutate it. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionState {
    pub persona_id: String,
    /// 0-100, drained by conversation, restored over idle time
    pub social_energy: f64,
    /// Accumulated tiredness, reduces continue scores
    pub interaction_fatigue: u32,
    /// Seconds the persona is willing to keep talking
    pub available_time: f64,
    /// While set and in the future, the persona refuses new conversations
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl InteractionState {
    pub fn new(persona_id: impl Into<String>) -> Self {
        Self {
            persona_id: persona_id.into(),
            social_energy: 100.0,
            interaction_fatigue: 0,
            available_time: 300.0,
            cooldown_until: None,
        }
    }

    /// Whether the persona can be engaged right now.
    ///
    /// Unavailable while cooling down or when social energy dropped below
    /// `low_energy` (config `low_social_energy`, default 30).
    pub fn is_available(&self, now: DateTime<Utc>, low_energy: f64) -> bool {
        if let Some(until) = self.cooldown_until {
            if until > now {
                return false;
            }
        }
        self.social_energy >= low_energy
    }

    /// Drain resources after `seconds` of conversation.
    pub fn apply_fatigue(&mut self, seconds: u64) {
        let minutes = (seconds as f64 / 60.0).ceil();
        self.interaction_fatigue += minutes as u32;
        self.social_energy = (self.social_energy - minutes * 2.0).max(0.0);
        self.available_time = (self.available_time - seconds as f64).max(0.0);
    }

    /// Restore energy and shed fatigue after `seconds` of idle time.
    /// `regen_rate` is energy points per minute.
    pub fn regenerate_energy(&mut self, seconds: u64, regen_rate: f64) {
        let minutes = seconds as f64 / 60.0;
        self.social_energy = (self.social_energy + minutes * regen_rate).min(100.0);
        self.interaction_fatigue = self.interaction_fatigue.saturating_sub(minutes as u32);
    }

    /// Enter cooldown for `base_seconds * multiplier` from `now`.
    ///
    /// The multiplier comes from how the conversation ended: 0.5 for a
    /// satisfying exchange, 2.0 for an unsatisfying one, 1.0 otherwise.
    pub fn begin_cooldown(&mut self, now: DateTime<Utc>, base_seconds: u64, multiplier: f64) {
        let secs = (base_seconds as f64 * multiplier).round() as i64;
        self.cooldown_until = Some(now + Duration::seconds(secs.max(0)));
    }
}

// ============================================================================
// RELATIONSHIP
// ============================================================================

/// Directionless relationship between two personas.
///
/// The pair is stored in sorted order so (a, b) and (b, a) address the same
/// row. Mutated by the orchestrator after persona-to-persona exchanges; the
/// scorers consume it read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub persona_a: String,
    pub persona_b: String,
    /// -1.0 .. 1.0
    pub affinity: f64,
    /// -1.0 .. 1.0
    pub trust: f64,
    /// -1.0 .. 1.0
    pub respect: f64,
    pub interaction_count: u64,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl Relationship {
    /// Create a neutral relationship; the pair is normalized to sorted order.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (mut a, mut b) = (a.into(), b.into());
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }
        Self {
            persona_a: a,
            persona_b: b,
            affinity: 0.0,
            trust: 0.0,
            respect: 0.0,
            interaction_count: 0,
            last_interaction: None,
        }
    }

    /// Weighted compatibility in [-1.0, 1.0]:
    /// 0.4 * affinity + 0.3 * trust + 0.3 * respect.
    pub fn compatibility_score(&self) -> f64 {
        0.4 * self.affinity + 0.3 * self.trust + 0.3 * self.respect
    }

    /// Whether `persona_id` is one of the pair.
    pub fn involves(&self, persona_id: &str) -> bool {
        self.persona_a == persona_id || self.persona_b == persona_id
    }

    /// The other member of the pair, if `persona_id` is a member.
    pub fn counterpart(&self, persona_id: &str) -> Option<&str> {
        if self.persona_a == persona_id {
            Some(&self.persona_b)
        } else if self.persona_b == persona_id {
            Some(&self.persona_a)
        } else {
            None
        }
    }

    /// Nudge the relationship after an exchange.
    ///
    /// `significance` in [0.0, 1.0] scales the step; affinity moves at full
    /// step, trust at half, respect at a third.
    pub fn update_from_interaction(&mut self, positive: bool, significance: f64, now: DateTime<Utc>) {
        let step = if positive { significance } else { -significance };
        self.affinity = (self.affinity + step).clamp(-1.0, 1.0);
        self.trust = (self.trust + step * 0.5).clamp(-1.0, 1.0);
        self.respect = (self.respect + step / 3.0).clamp(-1.0, 1.0);
        self.interaction_count += 1;
        self.last_interaction = Some(now);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability() {
        let now = Utc::now();
        let mut state = InteractionState::new("test");
        assert!(state.is_available(now, 30.0));

        state.cooldown_until = Some(now + Duration::seconds(60));
        assert!(!state.is_available(now, 30.0));

        state.cooldown_until = None;
        state.social_energy = 5.0;
        assert!(!state.is_available(now, 30.0));
    }

    #[test]
    fn test_apply_fatigue_drains_resources() {
        let mut state = InteractionState::new("test");
        let energy = state.social_energy;
        let time = state.available_time;

        state.apply_fatigue(120);

        assert!(state.interaction_fatigue > 0);
        assert!(state.social_energy < energy);
        assert!(state.available_time < time);
    }

    #[test]
    fn test_regenerate_energy() {
        let mut state = InteractionState::new("test");
        state.social_energy = 50.0;
        state.interaction_fatigue = 10;

        state.regenerate_energy(600, 2.0);

        assert!(state.social_energy > 50.0);
        assert!(state.interaction_fatigue < 10);
    }

    #[test]
    fn test_cooldown_multiplier() {
        let now = Utc::now();
        let mut state = InteractionState::new("test");
        state.begin_cooldown(now, 300, 2.0);
        assert_eq!(state.cooldown_until, Some(now + Duration::seconds(600)));
    }

    #[test]
    fn test_relationship_pair_is_normalized() {
        let rel = Relationship::new("kira", "aria");
        assert_eq!(rel.persona_a, "aria");
        assert_eq!(rel.persona_b, "kira");
        assert!(rel.involves("kira"));
        assert_eq!(rel.counterpart("aria"), Some("kira"));
        assert_eq!(rel.counterpart("bram"), None);
    }

    #[test]
    fn test_compatibility_score() {
        let mut rel = Relationship::new("alice", "bob");
        rel.affinity = 0.8;
        rel.trust = 0.6;
        rel.respect = 0.4;

        let expected = 0.8 * 0.4 + 0.6 * 0.3 + 0.4 * 0.3;
        assert!((rel.compatibility_score() - expected).abs() < 0.01);
    }

    #[test]
    fn test_update_from_interaction() {
        let mut rel = Relationship::new("alice", "bob");
        let before = rel.affinity;

        rel.update_from_interaction(true, 0.1, Utc::now());

        assert!(rel.affinity > before);
        assert_eq!(rel.interaction_count, 1);
        assert!(rel.last_interaction.is_some());

        rel.update_from_interaction(false, 0.3, Utc::now());
        assert!(rel.affinity < 0.1 + 1e-9);
    }

    #[test]
    fn test_clamping_at_extremes() {
        let mut rel = Relationship::new("alice", "bob");
        for _ in 0..20 {
            rel.update_from_interaction(true, 1.0, Utc::now());
        }
        assert!(rel.affinity <= 1.0);
        assert!(rel.trust <= 1.0);
        assert!(rel.respect <= 1.0);
    }
}
