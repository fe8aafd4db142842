//! WebSocket transport
//!
//! Clients connect to `/mcp` and exchange JSON-RPC messages as text frames.
//! Responses and streaming notifications multiplex over one outgoing
//! channel per connection, so a streaming chat never interleaves bytes with
//! another reply. `/healthz` answers liveness probes.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::methods::dispatch;
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::runtime::AppRuntime;
use crate::session::Session;

/// Outgoing frames buffered per connection before backpressure.
const OUTGOING_BUFFER: usize = 64;

pub fn router(runtime: Arc<AppRuntime>) -> Router {
    Router::new()
        .route("/mcp", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(runtime)
}

async fn healthz(State(runtime): State<Arc<AppRuntime>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": reverie_core::VERSION,
        "uptime_secs": runtime.uptime_secs(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(runtime): State<Arc<AppRuntime>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, runtime))
}

async fn handle_socket(socket: WebSocket, runtime: Arc<AppRuntime>) {
    runtime.sessions_open.fetch_add(1, Ordering::Relaxed);
    debug!("websocket client connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTGOING_BUFFER);

    // Writer task: the single place frames leave this connection.
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new();
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                debug!("websocket read error: {e}");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                let request: JsonRpcRequest = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("unparseable request: {e}");
                        send(&out_tx, JsonRpcResponse::error(None, JsonRpcError::parse_error()))
                            .await;
                        continue;
                    }
                };
                if request.jsonrpc != JSONRPC_VERSION {
                    let error = JsonRpcError::invalid_request("jsonrpc must be \"2.0\"");
                    if !send(&out_tx, JsonRpcResponse::error(request.id, error)).await {
                        break;
                    }
                    continue;
                }
                if let Some(response) = dispatch(&runtime, &mut session, request, &out_tx).await {
                    if !send(&out_tx, response).await {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            // Ping/pong is handled by the transport layer.
            _ => {}
        }
    }

    drop(out_tx);
    let _ = writer.await;
    runtime.sessions_open.fetch_sub(1, Ordering::Relaxed);
    debug!("websocket client disconnected");
}

async fn send(out: &mpsc::Sender<String>, response: JsonRpcResponse) -> bool {
    match serde_json::to_string(&response) {
        Ok(text) => out.send(text).await.is_ok(),
        Err(e) => {
            error!("failed to serialize response: {e}");
            // Minimal fallback so the client never hangs on a request.
            let fallback = r#"{"jsonrpc":"2.0","id":null,"result":null,"error":{"code":-32603,"message":"Internal error"}}"#;
            out.send(fallback.to_string()).await.is_ok()
        }
    }
}
