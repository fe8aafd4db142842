//! system.* methods

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::types::JsonRpcError;
use crate::runtime::AppRuntime;

pub async fn status(runtime: &Arc<AppRuntime>) -> Result<Value, JsonRpcError> {
    let persona_count = runtime
        .directory
        .list_personas()
        .map_err(|e| JsonRpcError::internal(&e.to_string()))?
        .len();

    let mut collections = Vec::new();
    for persona_id in runtime.manager.personas_with_collections().await {
        let total = runtime.manager.count(&persona_id).await;
        collections.push(json!({ "persona_id": persona_id, "total_memories": total }));
    }

    Ok(json!({
        "version": reverie_core::VERSION,
        "uptime_secs": runtime.uptime_secs(),
        "personas": persona_count,
        "open_sessions": runtime.sessions_open.load(Ordering::Relaxed),
        "requests_handled": runtime.requests_handled.load(Ordering::Relaxed),
        "collections": collections,
        "decay": runtime.decay.stats(),
        "pruning": runtime.pruner.stats(),
    }))
}
