//! Conversation scorer
//!
//! Produces the 0-100 continue score for one turn. Component budget:
//! time 30, topic 25, social 20 (+status bonus), resource 10, fatigue
//! penalty -15, history modifier +/-15. The orchestrator compares the total
//! against the continue threshold and terminates the exchange below it.

use serde::Serialize;

use crate::config::{ConversationConfig, PersonaConfig};
use crate::conversation::{ConversationContext, Priority};
use crate::persona::{InteractionState, Persona, Relationship};
use crate::scoring::topic_mentioned;

/// History modifier averages this many trailing scores.
const HISTORY_WINDOW: usize = 5;

/// Full fatigue penalty is reached at this many fatigue points.
const FULL_FATIGUE: f64 = 10.0;

/// One scored turn with its component breakdown.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TurnScore {
    pub total: f64,
    pub time: f64,
    pub topic: f64,
    pub social: f64,
    pub status_bonus: f64,
    pub resource: f64,
    pub fatigue_penalty: f64,
    pub history_modifier: f64,
}

/// Pure continue-score calculator.
#[derive(Debug, Clone)]
pub struct ConversationScorer {
    conversation: ConversationConfig,
    persona: PersonaConfig,
}

impl ConversationScorer {
    pub fn new(conversation: ConversationConfig, persona: PersonaConfig) -> Self {
        Self { conversation, persona }
    }

    /// Score one proposed turn from `speaker` toward `listener`.
    ///
    /// `listener_state` is the listener's interaction state; the listener is
    /// the party deciding whether the conversation is still worth having.
    pub fn score_turn(
        &self,
        speaker: &Persona,
        listener: &Persona,
        listener_state: &InteractionState,
        context: &ConversationContext,
        relationship: Option<&Relationship>,
        turn_text: &str,
    ) -> TurnScore {
        let cfg = &self.conversation;

        let time = self.time_score(listener_state, context.priority);
        let topic = self.topic_score(listener, context, turn_text);

        let compatibility = relationship
            .map(|r| (r.compatibility_score() + 1.0) / 2.0)
            .unwrap_or(0.5);
        let social = compatibility * cfg.max_social_score;
        let status_bonus = self.status_bonus(&speaker.social_rank, &listener.social_rank);

        let resource = self.resource_score(listener_state, context);

        let fatigue_penalty = (listener_state.interaction_fatigue as f64
            * cfg.max_fatigue_penalty
            / FULL_FATIGUE)
            .min(cfg.max_fatigue_penalty);

        let history_modifier = context
            .recent_score_mean(HISTORY_WINDOW)
            .map(|mean| ((mean - 50.0) / 50.0 * cfg.max_history_modifier))
            .unwrap_or(0.0)
            .clamp(-cfg.max_history_modifier, cfg.max_history_modifier);

        let total = (time + topic + social + status_bonus + resource - fatigue_penalty
            + history_modifier)
            .clamp(0.0, 100.0);

        TurnScore {
            total,
            time,
            topic,
            social,
            status_bonus,
            resource,
            fatigue_penalty,
            history_modifier,
        }
    }

    /// Cooldown multiplier from the final continue score: 0.5x after a
    /// satisfying exchange, 2.0x after an unsatisfying one.
    pub fn cooldown_multiplier(&self, final_score: f64) -> f64 {
        if final_score >= self.persona.high_continue_score {
            self.persona.satisfying_cooldown_multiplier
        } else if final_score < self.persona.continue_threshold {
            self.persona.unsatisfying_cooldown_multiplier
        } else {
            1.0
        }
    }

    /// Whether the exchange continues at this score.
    pub fn continues(&self, score: f64) -> bool {
        score >= self.persona.continue_threshold
    }

    // ========================================================================
    // COMPONENTS
    // ========================================================================

    /// Priority-driven time pressure. The decay rate converts remaining time
    /// into conversation credit: urgent exchanges burn 2 seconds of credit
    /// per second and so stay fully funded much longer than casual ones.
    fn time_score(&self, state: &InteractionState, priority: Priority) -> f64 {
        let cfg = &self.conversation;
        let rate = match priority {
            Priority::Urgent => cfg.urgent_decay_rate,
            Priority::Important => cfg.important_decay_rate,
            _ => cfg.casual_decay_rate,
        };
        let credit = state.available_time / (rate * 60.0);
        cfg.max_time_score * credit.clamp(0.0, 1.0)
    }

    /// Listener interest in the detected topics, averaged and normalized.
    fn topic_score(&self, listener: &Persona, context: &ConversationContext, text: &str) -> f64 {
        let cfg = &self.conversation;
        let lower = text.to_lowercase();

        let mut interests: Vec<f64> = listener
            .topic_preferences
            .iter()
            .filter(|(topic, _)| topic_mentioned(topic, &lower))
            .map(|(_, interest)| (*interest).min(100) as f64)
            .collect();

        if interests.is_empty() {
            if let Some(topic) = context.current_topic.as_deref() {
                if let Some(interest) = listener.topic_preferences.get(topic) {
                    interests.push((*interest).min(100) as f64);
                }
            }
        }

        let mean = if interests.is_empty() {
            cfg.default_interest as f64
        } else {
            interests.iter().sum::<f64>() / interests.len() as f64
        };
        mean / 100.0 * cfg.max_topic_score
    }

    /// Lowest of the three resource fractions decides the resource score.
    fn resource_score(&self, state: &InteractionState, context: &ConversationContext) -> f64 {
        let cfg = &self.conversation;
        let energy = (state.social_energy / 100.0).clamp(0.0, 1.0);
        let tokens = (context.token_budget as f64
            / (self.persona.low_token_budget as f64 * 2.0))
            .clamp(0.0, 1.0);
        let time = (state.available_time / self.persona.min_time_threshold_secs).clamp(0.0, 1.0);

        energy.min(tokens).min(time) * cfg.max_resource_score
    }

    /// Status compatibility bonus, added to the social component.
    fn status_bonus(&self, speaker_rank: &str, listener_rank: &str) -> f64 {
        let cfg = &self.conversation;
        match (cfg.rank_of(speaker_rank), cfg.rank_of(listener_rank)) {
            (Some(a), Some(b)) => {
                let gap = a.abs_diff(b) as u32;
                if gap == 0 {
                    cfg.same_status_bonus
                } else if gap == 1 {
                    cfg.adjacent_status_bonus
                } else if gap >= cfg.large_status_gap_threshold {
                    cfg.distant_status_bonus
                } else {
                    cfg.default_status_bonus
                }
            }
            _ => cfg.default_status_bonus,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ConversationScorer {
        ConversationScorer::new(ConversationConfig::default(), PersonaConfig::default())
    }

    fn persona(id: &str, rank: &str) -> Persona {
        let mut p = Persona::new(id, id, "test persona");
        p.social_rank = rank.to_string();
        p
    }

    fn fresh_state(id: &str) -> InteractionState {
        InteractionState::new(id)
    }

    #[test]
    fn test_score_is_bounded() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let b = persona("kira", "commoner");
        let score = s.score_turn(
            &a,
            &b,
            &fresh_state("kira"),
            &ConversationContext::default(),
            None,
            "a perfectly ordinary remark",
        );
        assert!((0.0..=100.0).contains(&score.total));
    }

    #[test]
    fn test_urgent_outscores_casual_on_time() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let b = persona("kira", "commoner");
        let state = fresh_state("kira");

        let mut urgent = ConversationContext::default();
        urgent.priority = Priority::Urgent;
        let mut casual = ConversationContext::default();
        casual.priority = Priority::Casual;

        let u = s.score_turn(&a, &b, &state, &urgent, None, "the gate is on fire");
        let c = s.score_turn(&a, &b, &state, &casual, None, "the gate is on fire");
        assert!(u.time > c.time);
    }

    #[test]
    fn test_topic_interest_raises_score() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let mut keen = persona("kira", "commoner");
        keen.topic_preferences.insert("magic".to_string(), 90);
        let mut bored = persona("bram", "commoner");
        bored.topic_preferences.insert("magic".to_string(), 5);

        let ctx = ConversationContext::default();
        let text = "I found a spellbook with a silver rune on the cover";

        let high = s.score_turn(&a, &keen, &fresh_state("kira"), &ctx, None, text);
        let low = s.score_turn(&a, &bored, &fresh_state("bram"), &ctx, None, text);
        assert!(high.topic > low.topic);
    }

    #[test]
    fn test_fatigue_penalty() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let b = persona("kira", "commoner");
        let ctx = ConversationContext::default();

        let rested = fresh_state("kira");
        let mut tired = fresh_state("kira");
        tired.interaction_fatigue = 20;

        let fresh = s.score_turn(&a, &b, &rested, &ctx, None, "hello again");
        let worn = s.score_turn(&a, &b, &tired, &ctx, None, "hello again");
        assert!(worn.total < fresh.total);
        assert_eq!(worn.fatigue_penalty, 15.0);
    }

    #[test]
    fn test_status_bonus_tiers() {
        let s = scorer();
        assert_eq!(s.status_bonus("commoner", "commoner"), 8.0);
        assert_eq!(s.status_bonus("commoner", "merchant"), 6.0);
        assert_eq!(s.status_bonus("peasant", "merchant"), 4.0);
        assert_eq!(s.status_bonus("peasant", "nobility"), 2.0);
        assert_eq!(s.status_bonus("pirate", "commoner"), 4.0);
    }

    #[test]
    fn test_resource_score_takes_minimum() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let b = persona("kira", "commoner");

        let mut ctx = ConversationContext::default();
        ctx.token_budget = 20; // 20 / 200 = 0.1 is the binding constraint
        let state = fresh_state("kira");

        let score = s.score_turn(&a, &b, &state, &ctx, None, "hello");
        assert!((score.resource - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_modifier_sign() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let b = persona("kira", "commoner");
        let state = fresh_state("kira");

        let mut warm = ConversationContext::default();
        for _ in 0..5 {
            warm.add_turn("aria", 90.0);
        }
        let mut cold = ConversationContext::default();
        for _ in 0..5 {
            cold.add_turn("aria", 10.0);
        }

        let up = s.score_turn(&a, &b, &state, &warm, None, "hello");
        let down = s.score_turn(&a, &b, &state, &cold, None, "hello");
        assert!(up.history_modifier > 0.0);
        assert!(down.history_modifier < 0.0);
        assert!(up.history_modifier <= 15.0);
        assert!(down.history_modifier >= -15.0);
    }

    #[test]
    fn test_relationship_feeds_social() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let b = persona("kira", "commoner");
        let state = fresh_state("kira");
        let ctx = ConversationContext::default();

        let mut warm = Relationship::new("aria", "kira");
        warm.affinity = 0.9;
        warm.trust = 0.9;
        warm.respect = 0.9;

        let with_rel = s.score_turn(&a, &b, &state, &ctx, Some(&warm), "hello");
        let without = s.score_turn(&a, &b, &state, &ctx, None, "hello");
        assert!(with_rel.social > without.social);
    }

    #[test]
    fn test_cooldown_multipliers() {
        let s = scorer();
        assert_eq!(s.cooldown_multiplier(85.0), 0.5);
        assert_eq!(s.cooldown_multiplier(55.0), 1.0);
        assert_eq!(s.cooldown_multiplier(20.0), 2.0);
    }

    #[test]
    fn test_determinism() {
        let s = scorer();
        let a = persona("aria", "commoner");
        let b = persona("kira", "merchant");
        let state = fresh_state("kira");
        let ctx = ConversationContext::default();

        let x = s.score_turn(&a, &b, &state, &ctx, None, "the caravan arrives at dawn");
        let y = s.score_turn(&a, &b, &state, &ctx, None, "the caravan arrives at dawn");
        assert_eq!(x.total, y.total);
    }
}
