//! memory.* methods
//!
//! Thin mappers from RPC params onto the engine: store, search (own and
//! cross-persona), stats, pruning, and decay inspection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use reverie_core::{CoreError, MemoryDraft, Visibility};

use crate::protocol::types::JsonRpcError;
use crate::runtime::AppRuntime;
use crate::session::Session;

use super::{parse_params, resolve_persona};

fn core_err(error: CoreError) -> JsonRpcError {
    JsonRpcError::from_core(&error)
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StoreParams {
    persona_id: Option<String>,
    content: String,
    memory_type: Option<String>,
    visibility: Option<Visibility>,
    importance: Option<f64>,
    related_personas: Option<BTreeSet<String>>,
    emotional_valence: Option<f64>,
    metadata: Option<BTreeMap<String, String>>,
}

pub async fn store(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: StoreParams = parse_params(params)?;
    if params.content.trim().is_empty() {
        return Err(JsonRpcError::invalid_params("content must not be empty"));
    }
    if let Some(importance) = params.importance {
        if !(0.0..=1.0).contains(&importance) {
            return Err(JsonRpcError::invalid_params(
                "importance must be within [0.0, 1.0]",
            ));
        }
    }
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let mut draft = MemoryDraft::new(params.content);
    if let Some(kind) = params.memory_type {
        draft.memory_type = kind;
    }
    if let Some(visibility) = params.visibility {
        draft.visibility = visibility;
    }
    draft.importance = params.importance;
    if let Some(related) = params.related_personas {
        draft.related_personas = related;
    }
    if let Some(valence) = params.emotional_valence {
        draft.emotional_valence = valence;
    }
    if let Some(metadata) = params.metadata {
        draft.metadata = metadata;
    }

    let context = session.context(&persona.id).cloned();
    let memory_id = runtime
        .manager
        .store(&persona.id, draft, context.as_ref())
        .await
        .map_err(core_err)?;

    Ok(json!({ "memory_id": memory_id }))
}

// ============================================================================
// SEARCH
// ============================================================================

fn default_n_results() -> usize {
    5
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SearchParams {
    persona_id: Option<String>,
    query: String,
    n_results: usize,
    min_importance: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            persona_id: None,
            query: String::new(),
            n_results: default_n_results(),
            min_importance: 0.0,
        }
    }
}

pub async fn search(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: SearchParams = parse_params(params)?;
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let memories = runtime
        .manager
        .search(&persona.id, &params.query, params.n_results, params.min_importance)
        .await
        .map_err(core_err)?;

    let count = memories.len();
    Ok(json!({
        "memories": memories,
        "count": count,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CrossSearchParams {
    persona_id: Option<String>,
    query: String,
    n_results: usize,
    min_importance: f64,
    include_shared: bool,
    include_public: bool,
}

impl Default for CrossSearchParams {
    fn default() -> Self {
        Self {
            persona_id: None,
            query: String::new(),
            n_results: default_n_results(),
            min_importance: 0.0,
            include_shared: true,
            include_public: true,
        }
    }
}

pub async fn search_cross_persona(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: CrossSearchParams = parse_params(params)?;
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let memories = runtime
        .manager
        .search_cross_persona(
            &persona.id,
            &params.query,
            params.n_results,
            params.min_importance,
            params.include_shared,
            params.include_public,
        )
        .await
        .map_err(core_err)?;

    let count = memories.len();
    Ok(json!({
        "memories": memories,
        "count": count,
    }))
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StatsParams {
    persona_id: Option<String>,
}

pub async fn stats(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: StatsParams = parse_params(params)?;
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let stats = runtime.manager.stats(&persona.id).await.map_err(core_err)?;
    let mut value = serde_json::to_value(stats)
        .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;
    value["persona_id"] = json!(persona.id);
    Ok(value)
}

// ============================================================================
// PRUNING
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PruneParams {
    persona_id: Option<String>,
    force: bool,
}

pub async fn prune_recommendations(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: StatsParams = parse_params(params)?;
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let recommendation = runtime
        .pruner
        .recommendations(&persona.id)
        .await
        .map_err(core_err)?;
    serde_json::to_value(recommendation).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
}

pub async fn prune(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: PruneParams = parse_params(params)?;
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let metrics = runtime
        .pruner
        .prune_persona(&persona.id, params.force)
        .await
        .map_err(core_err)?;
    serde_json::to_value(metrics).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
}

pub async fn prune_stats(runtime: &Arc<AppRuntime>) -> Result<Value, JsonRpcError> {
    serde_json::to_value(runtime.pruner.stats())
        .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
}

// ============================================================================
// DECAY
// ============================================================================

pub async fn decay_stats(runtime: &Arc<AppRuntime>) -> Result<Value, JsonRpcError> {
    serde_json::to_value(runtime.decay.stats())
        .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
}

fn default_decay_factor() -> f64 {
    0.1
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ForceDecayParams {
    persona_id: Option<String>,
    factor: f64,
}

impl Default for ForceDecayParams {
    fn default() -> Self {
        Self {
            persona_id: None,
            factor: default_decay_factor(),
        }
    }
}

pub async fn force_decay(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: ForceDecayParams = parse_params(params)?;
    if !(0.0..=1.0).contains(&params.factor) {
        return Err(JsonRpcError::invalid_params(
            "factor must be within [0.0, 1.0]",
        ));
    }
    let persona = resolve_persona(runtime, session, params.persona_id)?;

    let metrics = runtime
        .decay
        .force_decay(&persona.id, params.factor)
        .await
        .map_err(core_err)?;
    serde_json::to_value(metrics).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
}
