//! persona.* methods
//!
//! Listing, switching, chat (plain and streaming), status, and relationship
//! inspection. Chat is the full orchestration path: provider reply,
//! continue score, memory write, fatigue, and cooldown on termination.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use reverie_core::{ConversationContext, MemoryDraft, Persona, TurnScore};

use crate::protocol::types::{stream_event, JsonRpcError, JsonRpcResponse, StreamEventType};
use crate::runtime::AppRuntime;
use crate::session::Session;

use super::{parse_params, parse_required, resolve_persona};

// ============================================================================
// LIST / SWITCH / STATUS
// ============================================================================

pub async fn list(runtime: &Arc<AppRuntime>) -> Result<Value, JsonRpcError> {
    let personas = runtime
        .directory
        .list_personas()
        .map_err(|e| JsonRpcError::internal(&e.to_string()))?;
    let now = Utc::now();

    let listed: Vec<Value> = personas
        .iter()
        .map(|p| {
            let state = runtime.interaction(&p.id);
            json!({
                "id": p.id,
                "name": p.name,
                "description": p.description,
                "social_rank": p.social_rank,
                "available": state.is_available(now, runtime.config.persona.low_social_energy),
                "status": runtime.persona_status(&state, now),
                "social_energy": state.social_energy,
            })
        })
        .collect();
    Ok(json!({ "personas": listed }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SwitchParams {
    persona_id: String,
}

pub async fn switch(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: SwitchParams = parse_required(params)?;
    // Ids are matched case-insensitively; clients historically sent "Aria".
    let persona_id = params.persona_id.to_lowercase();
    let persona = runtime
        .directory
        .persona(&persona_id)
        .map_err(|e| JsonRpcError::internal(&e.to_string()))?
        .ok_or_else(|| JsonRpcError::invalid_persona(&persona_id))?;

    session.current_persona = Some(persona.id.clone());
    let state = runtime.interaction(&persona.id);
    debug!(persona = %persona.id, "session switched persona");

    Ok(json!({
        "id": persona.id,
        "name": persona.name,
        "status": runtime.persona_status(&state, Utc::now()),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StatusParams {
    persona_id: Option<String>,
}

pub async fn status(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: StatusParams = parse_params(params)?;
    let persona = resolve_persona(runtime, session, params.persona_id)?;
    let state = runtime.interaction(&persona.id);
    let context = session.context(&persona.id);

    Ok(json!({
        "persona_id": persona.id,
        "name": persona.name,
        "status": runtime.persona_status(&state, Utc::now()),
        "social_energy": state.social_energy,
        "interaction_fatigue": state.interaction_fatigue,
        "available_time": state.available_time,
        "cooldown_until": state.cooldown_until,
        "conversation": context.map(|c| json!({
            "turn_count": c.turn_count,
            "continue_score": c.continue_score,
            "token_budget": c.token_budget,
        })),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RelationshipParams {
    persona_id: Option<String>,
    target_persona: Option<String>,
}

pub async fn relationship(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: RelationshipParams = parse_params(params)?;
    let persona = resolve_persona(runtime, session, params.persona_id)?;
    let target = params
        .target_persona
        .ok_or_else(|| JsonRpcError::invalid_params("target_persona is required"))?
        .to_lowercase();

    let relationship = runtime
        .directory
        .relationship(&persona.id, &target)
        .map_err(|e| JsonRpcError::internal(&e.to_string()))?;

    Ok(json!({
        "persona_id": persona.id,
        "target_persona": target,
        "relationship": relationship.as_ref().map(|r| json!({
            "affinity": r.affinity,
            "trust": r.trust,
            "respect": r.respect,
            "compatibility": r.compatibility_score(),
            "interaction_count": r.interaction_count,
            "last_interaction": r.last_interaction,
        })),
    }))
}

// ============================================================================
// CHAT
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ChatParams {
    persona_id: Option<String>,
    message: String,
    token_budget: Option<u32>,
}

/// Everything that happens after a reply exists: scoring, context update,
/// memory write, fatigue, and (possibly) termination with cooldown.
struct TurnOutcome {
    score: TurnScore,
    active: bool,
    memory_id: Option<String>,
}

async fn settle_turn(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    persona: &Persona,
    message: &str,
    response: &str,
) -> TurnOutcome {
    let now = Utc::now();
    let state = runtime.interaction(&persona.id);
    let exchange = format!("{message} {response}");

    let (score, active, snapshot): (TurnScore, bool, ConversationContext) = {
        let ctx = session.context_mut(&persona.id, None);
        let score = runtime
            .scorer
            .score_turn(persona, persona, &state, ctx, None, &exchange);
        ctx.add_turn(persona.id.clone(), score.total);
        let spent = response.split_whitespace().count() as u32;
        ctx.token_budget = ctx.token_budget.saturating_sub(spent);
        let active = ctx.should_continue(
            runtime.config.persona.continue_threshold,
            runtime.config.persona.low_token_budget,
        );
        (score, active, ctx.clone())
    };

    // The exchange becomes a private conversation memory. Chat keeps going
    // even when the write fails; the reply already exists.
    let mut draft = MemoryDraft::new(format!("User: {message}\n{}: {response}", persona.name));
    draft.memory_type = "conversation".to_string();
    let memory_id = match runtime
        .manager
        .store(&persona.id, draft, Some(&snapshot))
        .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(persona = %persona.id, "failed to store chat memory: {e}");
            None
        }
    };

    let turn_seconds = runtime.config.persona.turn_seconds;
    runtime.update_interaction(&persona.id, |s| s.apply_fatigue(turn_seconds));

    if !active {
        let multiplier = runtime.scorer.cooldown_multiplier(score.total);
        let base = runtime.config.persona.base_cooldown_secs;
        runtime.update_interaction(&persona.id, |s| s.begin_cooldown(now, base, multiplier));
        session.end_context(&persona.id);
        debug!(
            persona = %persona.id,
            score = score.total,
            multiplier,
            "conversation terminated, cooldown applied"
        );
    }

    TurnOutcome {
        score,
        active,
        memory_id,
    }
}

pub async fn chat(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: ChatParams = parse_params(params)?;
    if params.message.trim().is_empty() {
        return Err(JsonRpcError::invalid_params("message must not be empty"));
    }
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let budget = session
        .context_mut(&persona.id, params.token_budget)
        .token_budget;
    let response = runtime
        .provider
        .complete(&persona, &params.message, budget)
        .await
        .map_err(|e| JsonRpcError::internal(&e.to_string()))?;

    let outcome = settle_turn(runtime, session, &persona, &params.message, &response).await;

    Ok(json!({
        "response": response,
        "continue_score": outcome.score.total,
        "conversation_active": outcome.active,
        "memory_id": outcome.memory_id,
    }))
}

// ============================================================================
// STREAMING CHAT
// ============================================================================

async fn emit(out: &mpsc::Sender<String>, event: JsonRpcResponse) -> bool {
    match serde_json::to_string(&event) {
        Ok(text) => out.send(text).await.is_ok(),
        Err(e) => {
            warn!("failed to serialize stream event: {e}");
            false
        }
    }
}

pub async fn chat_stream(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
    id: Option<Value>,
    out: &mpsc::Sender<String>,
) -> Option<JsonRpcResponse> {
    let params: ChatParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return Some(JsonRpcResponse::error(id, e)),
    };
    if params.message.trim().is_empty() {
        return Some(JsonRpcResponse::error(
            id,
            JsonRpcError::invalid_params("message must not be empty"),
        ));
    }
    let persona = match resolve_persona(runtime, session, params.persona_id) {
        Ok(p) => p,
        Err(e) => return Some(JsonRpcResponse::error(id, e)),
    };

    let stream_id = Uuid::new_v4().to_string();
    if !emit(
        out,
        stream_event(
            &id,
            &stream_id,
            StreamEventType::StreamStart,
            json!({ "persona_id": persona.id, "persona_name": persona.name }),
        ),
    )
    .await
    {
        return None;
    }

    let budget = session
        .context_mut(&persona.id, params.token_budget)
        .token_budget;
    let mut chunks = match runtime.provider.stream(&persona, &params.message, budget).await {
        Ok(rx) => rx,
        Err(e) => {
            emit(
                out,
                stream_event(
                    &id,
                    &stream_id,
                    StreamEventType::StreamError,
                    json!({ "error": e.to_string() }),
                ),
            )
            .await;
            return None;
        }
    };

    let mut full_response = String::new();
    let mut chunk_number = 0u32;
    while let Some(chunk) = chunks.recv().await {
        match chunk {
            Ok(text) => {
                chunk_number += 1;
                full_response.push_str(&text);
                let delivered = emit(
                    out,
                    stream_event(
                        &id,
                        &stream_id,
                        StreamEventType::StreamChunk,
                        json!({ "chunk": text, "chunk_number": chunk_number }),
                    ),
                )
                .await;
                if !delivered {
                    // Client went away mid-stream.
                    emit(
                        out,
                        stream_event(&id, &stream_id, StreamEventType::StreamCancelled, json!({})),
                    )
                    .await;
                    return None;
                }
            }
            Err(e) => {
                emit(
                    out,
                    stream_event(
                        &id,
                        &stream_id,
                        StreamEventType::StreamError,
                        json!({ "error": e.to_string() }),
                    ),
                )
                .await;
                return None;
            }
        }
    }

    let outcome = settle_turn(runtime, session, &persona, &params.message, &full_response).await;

    emit(
        out,
        stream_event(
            &id,
            &stream_id,
            StreamEventType::StreamComplete,
            json!({
                "full_response": full_response,
                "chunk_count": chunk_number,
                "continue_score": outcome.score.total,
                "conversation_active": outcome.active,
                "memory_id": outcome.memory_id,
            }),
        ),
    )
    .await;
    None
}
