//! Conversation context - per-session state the scorers read
//!
//! A context lives exactly as long as the session's exchange with one
//! persona. It never outlives the orchestrator's session record and is not
//! persisted anywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation priority, driving time-pressure decay in the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    Important,
    Casual,
    Social,
    Academic,
    #[default]
    None,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::Important => "important",
            Priority::Casual => "casual",
            Priority::Social => "social",
            Priority::Academic => "academic",
            Priority::None => "none",
        }
    }
}

/// Rolling state for one conversation.
///
/// `participants` is ordered; the first entry is the initiator. The continue
/// score defaults to 50 (neutral) until the first scored turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub participants: Vec<String>,
    pub turn_count: u32,
    pub continue_score: f64,
    pub score_history: Vec<f64>,
    pub token_budget: u32,
    pub current_speaker: Option<String>,
    pub priority: Priority,
    pub current_topic: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(participants: Vec<String>) -> Self {
        Self {
            participants,
            turn_count: 0,
            continue_score: 50.0,
            score_history: Vec::new(),
            token_budget: 500,
            current_speaker: None,
            priority: Priority::None,
            current_topic: None,
            started_at: Utc::now(),
        }
    }

    /// The participant who opened the conversation.
    pub fn initiator(&self) -> Option<&str> {
        self.participants.first().map(String::as_str)
    }

    /// Record a scored turn: bumps the turn counter, sets the speaker, and
    /// appends to the score history.
    pub fn add_turn(&mut self, speaker: impl Into<String>, score: f64) {
        self.turn_count += 1;
        self.current_speaker = Some(speaker.into());
        self.continue_score = score;
        self.score_history.push(score);
    }

    /// Whether the exchange should keep going.
    ///
    /// Fails either on a continue score below `threshold` or a token budget
    /// below `low_token_budget`.
    pub fn should_continue(&self, threshold: f64, low_token_budget: u32) -> bool {
        self.continue_score >= threshold && self.token_budget >= low_token_budget
    }

    /// Mean of the most recent `n` scores, if any were recorded.
    pub fn recent_score_mean(&self, n: usize) -> Option<f64> {
        if self.score_history.is_empty() {
            return None;
        }
        let tail = &self.score_history[self.score_history.len().saturating_sub(n)..];
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

// ============================================================================
// TESTS
// ============================================================================
