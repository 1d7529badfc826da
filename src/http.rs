use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{DocToolError, Result};
use crate::mcp::{parse_args, process_request, RpcRequest};
use crate::tools::{tool_catalog, ToolKit};

pub type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

#[derive(Clone)]
pub struct AppState {
    pub toolkit: Arc<ToolKit>,
    pub sessions: Sessions,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

async fn list_tools_handler() -> impl IntoResponse {
    Json(json!({ "tools": tool_catalog() }))
}

async fn call_tool_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let arguments = match payload {
        Ok(Json(v)) if v.is_null() => json!({}),
        Ok(Json(v)) => v,
        Err(e) => {
            return ErrorResponse {
                error: format!("invalid request body: {e}"),
            }
            .into_response()
        }
    };
    let args = match parse_args(arguments) {
        Ok(a) => a,
        Err(e) => {
            return ErrorResponse {
                error: e.to_string(),
            }
            .into_response()
        }
    };

    // tool failures are payloads, not transport errors
    let output = state.toolkit.call(&name, args).await;
    (StatusCode::OK, Json(output)).into_response()
}

/// Drops the session entry when its event stream goes away.
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&self.id);
        }
        info!(session_id = %self.id, "sse session closed");
    }
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = format!("{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));

    let endpoint_url = format!("/message?session_id={}", session_id);
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    if let Ok(mut sessions) = state.sessions.write() {
        sessions.insert(session_id.clone(), tx);
    }
    info!(%session_id, "sse session opened");

    let guard = SessionGuard {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _alive = &guard;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    Json(req): Json<RpcRequest>,
) -> impl IntoResponse {
    let sender = state
        .sessions
        .read()
        .ok()
        .and_then(|sessions| sessions.get(&q.session_id).cloned());

    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let toolkit = state.toolkit.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        if let Some(resp) = process_request(&toolkit, req).await {
            if let Ok(json_str) = serde_json::to_string(&resp) {
                if sender.send(Event::default().event("message").data(json_str)).is_err() {
                    if let Ok(mut sessions) = sessions.write() {
                        sessions.remove(&q.session_id);
                    }
                }
            }
        }
    });
    StatusCode::ACCEPTED
}

pub fn build_router(toolkit: Arc<ToolKit>) -> Router {
    let state = AppState {
        toolkit,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/tools/:name", post(call_tool_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .with_state(state)
}

pub async fn serve_http(toolkit: Arc<ToolKit>, server: &ServerConfig) -> Result<()> {
    let router = build_router(toolkit);

    let addr = format!(
        "{}:{}",
        server.http_addr.as_deref().unwrap_or("127.0.0.1"),
        server.http_port.unwrap_or(3000)
    );
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DocToolError::Config(format!("bind {addr} failed: {e}")))?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, router).await.map_err(|e| e.into())
}
