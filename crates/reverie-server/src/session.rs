//! Per-connection session state
//!
//! Each WebSocket connection carries one session: the active persona and the
//! live conversation contexts. Contexts die with the session.

use std::collections::HashMap;

use reverie_core::ConversationContext;

/// The party label used for the human side of every context.
pub const CLIENT_PARTICIPANT: &str = "user";

#[derive(Default)]
pub struct Session {
    pub current_persona: Option<String>,
    contexts: HashMap<String, ConversationContext>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live context with `persona_id`, created on first turn. A provided
    /// token budget replaces the current one.
    pub fn context_mut(
        &mut self,
        persona_id: &str,
        token_budget: Option<u32>,
    ) -> &mut ConversationContext {
        let ctx = self.contexts.entry(persona_id.to_string()).or_insert_with(|| {
            ConversationContext::new(vec![
                CLIENT_PARTICIPANT.to_string(),
                persona_id.to_string(),
            ])
        });
        if let Some(budget) = token_budget {
            ctx.token_budget = budget;
        }
        ctx
    }

    pub fn context(&self, persona_id: &str) -> Option<&ConversationContext> {
        self.contexts.get(persona_id)
    }

    /// Drop the context after a terminated conversation.
    pub fn end_context(&mut self, persona_id: &str) -> Option<ConversationContext> {
        self.contexts.remove(persona_id)
    }
}
