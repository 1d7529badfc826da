use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{DocToolError, Result};
use crate::model::{ToolArgs, ToolOutput};
use crate::tools::{tool_catalog, ToolKit, TOOL_NAMES};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Serve newline-delimited JSON-RPC on stdin/stdout.
///
/// Each request runs on its own task; replies are written as they finish.
pub async fn run_stdio(toolkit: Arc<ToolKit>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let (tx, mut rx) = mpsc::unbounded_channel::<RpcResponse>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(resp) = rx.recv().await {
            if let Err(e) = write_response(&mut stdout, &resp).await {
                error!("failed to write response: {e}");
                break;
            }
        }
    });

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(error_response(Value::Null, -32700, format!("parse error: {e}")));
                continue;
            }
        };

        let toolkit = toolkit.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(resp) = process_request(&toolkit, req).await {
                let _ = tx.send(resp);
            }
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Handle one request. Notifications (no id) get no reply.
pub async fn process_request(toolkit: &ToolKit, req: RpcRequest) -> Option<RpcResponse> {
    debug!(method = %req.method, "rpc request");
    let resp = match req.method.as_str() {
        "initialize" => success(req.id, initialize_result()),
        "notifications/initialized" | "initialized" => {
            if req.id.is_null() {
                return None;
            }
            success(req.id, Value::Bool(true))
        }
        "ping" => success(req.id, json!({})),
        "tools/list" | "list_tools" => success(req.id, json!({ "tools": tool_catalog() })),
        "tools/call" => match serde_json::from_value::<CallParams>(req.params) {
            Ok(p) => call_tool(toolkit, req.id, &p.name, p.arguments).await,
            Err(e) => error_response(req.id, -32602, format!("invalid params: {e}")),
        },
        method if TOOL_NAMES.contains(&method) => {
            let name = method.to_string();
            call_tool(toolkit, req.id, &name, req.params).await
        }
        _ => {
            if req.id.is_null() {
                return None;
            }
            error_response(req.id, -32601, format!("method not found: {}", req.method))
        }
    };
    Some(resp)
}

async fn call_tool(toolkit: &ToolKit, id: Value, name: &str, arguments: Value) -> RpcResponse {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    let args = match parse_args(arguments) {
        Ok(a) => a,
        Err(e) => return error_response(id, -32602, e.to_string()),
    };
    let output = toolkit.call(name, args).await;
    success(id, tool_result(&output))
}

pub fn parse_args(arguments: Value) -> Result<ToolArgs> {
    serde_json::from_value(arguments)
        .map_err(|e| DocToolError::InvalidRequest(format!("invalid arguments: {e}")))
}

/// MCP `CallToolResult` shape.
pub fn tool_result(output: &ToolOutput) -> Value {
    json!({
        "content": [{ "type": "text", "text": output.text }],
        "isError": output.is_error
    })
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn success(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn error_response(id: Value, code: i32, message: String) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}

async fn write_response(stdout: &mut tokio::io::Stdout, resp: &RpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
