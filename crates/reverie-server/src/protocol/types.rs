//! JSON-RPC 2.0 types
//!
//! Standard codes plus the application codes the runtime surfaces
//! (INVALID_PERSONA, EMBEDDER_UNAVAILABLE, PRUNE_IN_PROGRESS, INTERNAL).
//! Error responses carry `result: null` alongside `error`, matching the
//! original wire contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use reverie_core::CoreError;

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// JSON-RPC request. A missing `id` marks a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            // Errors carry an explicit null result on this wire.
            result: Some(Value::Null),
            error: Some(error),
        }
    }
}

// ============================================================================
// ERROR CODES
// ============================================================================

/// JSON-RPC error codes (standard + application range)
#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    // Standard JSON-RPC errors
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // Application errors (-32000 to -32099)
    Internal = -32000,
    InvalidPersona = -32001,
    EmbedderUnavailable = -32002,
    PruneInProgress = -32003,
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code as i32
    }
}

/// JSON-RPC error object. `data.code` carries the stable application code
/// string; policy errors also carry the identifiers involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(ErrorCode::ParseError, "Parse error")
    }

    pub fn invalid_request(message: &str) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Unknown method: {method}"))
    }

    pub fn invalid_params(message: &str) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn invalid_persona(persona_id: &str) -> Self {
        let mut err = Self::new(
            ErrorCode::InvalidPersona,
            format!("Unknown persona: {persona_id}"),
        );
        err.data = Some(serde_json::json!({
            "code": "INVALID_PERSONA",
            "persona_id": persona_id,
        }));
        err
    }

    pub fn embedder_unavailable(message: &str) -> Self {
        let mut err = Self::new(
            ErrorCode::EmbedderUnavailable,
            format!("Embedder unavailable: {message}"),
        );
        err.data = Some(serde_json::json!({ "code": "EMBEDDER_UNAVAILABLE" }));
        err
    }

    pub fn prune_in_progress(persona_id: &str) -> Self {
        let mut err = Self::new(
            ErrorCode::PruneInProgress,
            format!("Prune already in progress for persona: {persona_id}"),
        );
        err.data = Some(serde_json::json!({
            "code": "PRUNE_IN_PROGRESS",
            "persona_id": persona_id,
        }));
        err
    }

    pub fn internal(message: &str) -> Self {
        let mut err = Self::new(ErrorCode::Internal, message);
        err.data = Some(serde_json::json!({ "code": "INTERNAL" }));
        err
    }

    /// Map an engine error onto the wire.
    pub fn from_core(error: &CoreError) -> Self {
        match error {
            CoreError::InvalidPersona(id) => Self::invalid_persona(id),
            CoreError::MemoryNotFound(id) => {
                Self::new(ErrorCode::Internal, format!("Memory not found: {id}"))
            }
            CoreError::EmbedderUnavailable(e) => Self::embedder_unavailable(&e.to_string()),
            CoreError::PruneInProgress(id) => Self::prune_in_progress(id),
            other => Self::internal(&other.to_string()),
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

// ============================================================================
// STREAMING EVENTS
// ============================================================================

/// Event types for streamed chat replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    StreamStart,
    StreamChunk,
    StreamComplete,
    StreamError,
    StreamCancelled,
}

/// Build a streaming notification correlated with the request id.
pub fn stream_event(
    id: &Option<Value>,
    stream_id: &str,
    event_type: StreamEventType,
    data: Value,
) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: id.clone(),
        result: Some(serde_json::json!({
            "event_type": event_type,
            "stream_id": stream_id,
            "data": data,
        })),
        error: None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
