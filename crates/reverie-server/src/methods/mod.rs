//! Method dispatch
//!
//! Routes JSON-RPC methods to their handlers. Streaming methods send
//! correlated notifications through the connection's outgoing channel and
//! produce no direct response.

pub mod memory;
pub mod persona;
pub mod system;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use reverie_core::Persona;

use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::runtime::AppRuntime;
use crate::session::Session;

/// Handle one request. `None` means nothing to send back (a notification,
/// or a streaming method that already answered through `out`).
pub async fn dispatch(
    runtime: &Arc<AppRuntime>,
    session: &mut Session,
    request: JsonRpcRequest,
    out: &mpsc::Sender<String>,
) -> Option<JsonRpcResponse> {
    runtime.requests_handled.fetch_add(1, Ordering::Relaxed);
    debug!(method = %request.method, "handling request");

    let id = request.id.clone();
    let result = match request.method.as_str() {
        "persona.list" => persona::list(runtime).await,
        "persona.switch" => persona::switch(runtime, session, request.params).await,
        "persona.chat" => persona::chat(runtime, session, request.params).await,
        "persona.chat_stream" => {
            return persona::chat_stream(runtime, session, request.params, id, out).await;
        }
        "persona.status" => persona::status(runtime, session, request.params).await,
        "persona.relationship" => persona::relationship(runtime, session, request.params).await,
        "memory.store" => memory::store(runtime, session, request.params).await,
        "memory.search" => memory::search(runtime, session, request.params).await,
        "memory.search_cross_persona" => {
            memory::search_cross_persona(runtime, session, request.params).await
        }
        "memory.stats" => memory::stats(runtime, session, request.params).await,
        "memory.prune_recommendations" => {
            memory::prune_recommendations(runtime, session, request.params).await
        }
        "memory.prune" => memory::prune(runtime, session, request.params).await,
        "memory.prune_stats" => memory::prune_stats(runtime).await,
        "memory.decay_stats" => memory::decay_stats(runtime).await,
        "memory.force_decay" => memory::force_decay(runtime, session, request.params).await,
        "system.status" => system::status(runtime).await,
        other => Err(JsonRpcError::method_not_found(other)),
    };

    // No id means notification semantics: never answer.
    id.as_ref()?;
    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(error) => JsonRpcResponse::error(id, error),
    })
}

/// Parse optional params into a typed struct; absent params mean defaults.
pub(crate) fn parse_params<T: DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T, JsonRpcError> {
    match params {
        Some(value) => {
            serde_json::from_value(value).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))
        }
        None => Ok(T::default()),
    }
}

/// Parse params for methods whose params object is mandatory.
pub(crate) fn parse_required<T: DeserializeOwned>(params: Option<Value>) -> Result<T, JsonRpcError> {
    match params {
        Some(value) => {
            serde_json::from_value(value).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))
        }
        None => Err(JsonRpcError::invalid_params("missing params")),
    }
}

/// Resolve the target persona: explicit `persona_id` wins, otherwise the
/// session's current persona.
pub(crate) fn resolve_persona(
    runtime: &AppRuntime,
    session: &Session,
    explicit: Option<String>,
) -> Result<Persona, JsonRpcError> {
    let persona_id = explicit
        .or_else(|| session.current_persona.clone())
        .ok_or_else(|| {
            JsonRpcError::invalid_params(
                "no persona selected; pass persona_id or call persona.switch first",
            )
        })?;
    runtime
        .directory
        .persona(&persona_id)
        .map_err(|e| JsonRpcError::internal(&e.to_string()))?
        .ok_or_else(|| JsonRpcError::invalid_persona(&persona_id))
}
