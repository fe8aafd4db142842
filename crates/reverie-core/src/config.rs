//! Runtime configuration
//!
//! Plain serde structs with defaults; the server binary layers file and
//! environment sources on top of these (figment) and then calls
//! [`RuntimeConfig::validate`]. Validation failures are fatal at startup:
//! a weight set that does not sum to 1.0 or an inverted importance range is
//! an invariant violation, not something to limp along with.

use serde::{Deserialize, Serialize};

use crate::memory::decay::DecayConfig;
use crate::memory::pruning::PruningConfig;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration validation failed:\n{0}")]
    Validation(String),
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Listener settings for the RPC channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_connections: 100,
        }
    }
}

/// LLM provider selection. `scripted` needs no external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "scripted" or "ollama"
    pub provider: String,
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "scripted".to_string(),
            host: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

/// Importance-scoring weights. Must sum to 1.0 (validated at startup).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryWeights {
    pub content: f64,
    pub engagement: f64,
    pub persona: f64,
    pub temporal: f64,
    pub relationship: f64,
    pub recency: f64,
}

impl Default for MemoryWeights {
    fn default() -> Self {
        Self {
            content: 0.30,
            engagement: 0.20,
            persona: 0.15,
            temporal: 0.05,
            relationship: 0.10,
            recency: 0.20,
        }
    }
}

impl MemoryWeights {
    pub fn sum(&self) -> f64 {
        self.content + self.engagement + self.persona + self.temporal + self.relationship + self.recency
    }
}

/// Importance bounds for fresh writes plus the scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Lower clip for freshly scored memories
    pub importance_min: f64,
    /// Upper clip for freshly scored memories
    pub importance_max: f64,
    pub weights: MemoryWeights,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            importance_min: 0.51,
            importance_max: 0.80,
            weights: MemoryWeights::default(),
        }
    }
}

/// Persona interaction defaults and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Below this continue score the conversation ends
    pub continue_threshold: f64,
    /// At or above this final score a termination counts as satisfying
    pub high_continue_score: f64,
    pub low_continue_score: f64,
    /// Seconds of remaining time considered "enough" for the resource score
    pub min_time_threshold_secs: f64,
    /// Token budgets below this end the conversation
    pub low_token_budget: u32,
    /// Social energy below this makes a persona unavailable
    pub low_social_energy: f64,
    pub satisfying_cooldown_multiplier: f64,
    pub unsatisfying_cooldown_multiplier: f64,
    pub base_cooldown_secs: u64,
    pub default_social_energy: f64,
    pub default_available_time_secs: f64,
    /// Energy points regained per idle minute
    pub energy_regen_rate: f64,
    /// Fatigue charged per chat turn, in seconds of conversation
    pub turn_seconds: u64,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            continue_threshold: 40.0,
            high_continue_score: 70.0,
            low_continue_score: 30.0,
            min_time_threshold_secs: 60.0,
            low_token_budget: 100,
            low_social_energy: 30.0,
            satisfying_cooldown_multiplier: 0.5,
            unsatisfying_cooldown_multiplier: 2.0,
            base_cooldown_secs: 300,
            default_social_energy: 100.0,
            default_available_time_secs: 300.0,
            energy_regen_rate: 2.0,
            turn_seconds: 30,
        }
    }
}

/// Continue-score component maxima and status hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_time_score: f64,
    pub max_topic_score: f64,
    pub max_social_score: f64,
    pub max_resource_score: f64,
    pub max_fatigue_penalty: f64,
    pub max_history_modifier: f64,
    /// Time-pressure decay rates, seconds of credit burned per second
    pub urgent_decay_rate: f64,
    pub important_decay_rate: f64,
    pub casual_decay_rate: f64,
    pub same_status_bonus: f64,
    pub adjacent_status_bonus: f64,
    pub distant_status_bonus: f64,
    pub default_status_bonus: f64,
    pub large_status_gap_threshold: u32,
    /// Ranks ordered lowest to highest
    pub status_hierarchy: Vec<String>,
    /// Interest assumed for topics the listener has no preference for
    pub default_interest: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_time_score: 30.0,
            max_topic_score: 25.0,
            max_social_score: 20.0,
            max_resource_score: 10.0,
            max_fatigue_penalty: 15.0,
            max_history_modifier: 15.0,
            urgent_decay_rate: 2.0,
            important_decay_rate: 10.0,
            casual_decay_rate: 30.0,
            same_status_bonus: 8.0,
            adjacent_status_bonus: 6.0,
            distant_status_bonus: 2.0,
            default_status_bonus: 4.0,
            large_status_gap_threshold: 3,
            status_hierarchy: vec![
                "peasant".to_string(),
                "commoner".to_string(),
                "merchant".to_string(),
                "nobility".to_string(),
                "royalty".to_string(),
            ],
            default_interest: 50,
        }
    }
}

impl ConversationConfig {
    /// Position of a rank in the hierarchy, if known.
    pub fn rank_of(&self, social_rank: &str) -> Option<usize> {
        self.status_hierarchy.iter().position(|r| r == social_rank)
    }
}

// ============================================================================
// RUNTIME CONFIG
// ============================================================================

/// Everything the core reads, in one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub decay: DecayConfig,
    pub pruning: PruningConfig,
    pub persona: PersonaConfig,
    pub conversation: ConversationConfig,
}

impl RuntimeConfig {
    /// Validate cross-field invariants. Called once at startup; any failure
    /// aborts the process before workers spawn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let weight_sum = self.memory.weights.sum();
        if (weight_sum - 1.0).abs() > 0.01 {
            errors.push(format!(
                "memory scoring weights sum to {weight_sum:.3}, should be 1.0"
            ));
        }

        if self.memory.importance_min >= self.memory.importance_max {
            errors.push("memory importance_min must be less than importance_max".to_string());
        }
        if !(0.0..=1.0).contains(&self.memory.importance_min)
            || !(0.0..=1.0).contains(&self.memory.importance_max)
        {
            errors.push("memory importance bounds must be within [0.0, 1.0]".to_string());
        }

        if self.server.port == 0 {
            errors.push("server port must be between 1 and 65535".to_string());
        }

        if !(self.pruning.max_prune_percent > 0.0 && self.pruning.max_prune_percent <= 1.0) {
            errors.push("pruning max_prune_percent must be in (0.0, 1.0]".to_string());
        }
        if self.pruning.target_memories_per_persona == 0 {
            errors.push("pruning target_memories_per_persona must be at least 1".to_string());
        }

        if !(0.0..=100.0).contains(&self.persona.continue_threshold) {
            errors.push("persona continue_threshold must be between 0 and 100".to_string());
        }

        if !(0.0..1.0).contains(&self.decay.min_importance_floor) {
            errors.push("decay min_importance_floor must be in [0.0, 1.0)".to_string());
        }
        if !(0.0..=1.0).contains(&self.decay.protected_importance) {
            errors.push("decay protected_importance must be in [0.0, 1.0]".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            let joined = errors
                .iter()
                .map(|e| format!("  - {e}"))
                .collect::<Vec<_>>()
                .join("\n");
            Err(ConfigError::Validation(joined))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        RuntimeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!((MemoryWeights::default().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = RuntimeConfig::default();
        config.memory.weights.content = 0.9;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("weights sum"));
    }

    #[test]
    fn test_inverted_importance_bounds_rejected() {
        let mut config = RuntimeConfig::default();
        config.memory.importance_min = 0.9;
        config.memory.importance_max = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = RuntimeConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prune_percent_range() {
        let mut config = RuntimeConfig::default();
        config.pruning.max_prune_percent = 0.0;
        assert!(config.validate().is_err());
        config.pruning.max_prune_percent = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rank_lookup() {
        let config = ConversationConfig::default();
        assert_eq!(config.rank_of("peasant"), Some(0));
        assert_eq!(config.rank_of("royalty"), Some(4));
        assert_eq!(config.rank_of("pirate"), None);
    }
}
