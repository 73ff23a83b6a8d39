// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The structured endpoint (component G): identical socket lifecycle to the
//! chat endpoint, but framing is the request/response/notification codec
//! of `core_protocol::structured` and dispatch is by method name against a
//! closed table (spec §4.G).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use core_model::{CompletionRequest, Message as ModelMessage};
use core_protocol::{StructuredCodec, StructuredError};
use core_terminal::CommandSource;

use crate::state::AppState;
use crate::task_table::{TaskState, TaskTable};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const OUTBOX_CAPACITY: usize = 256;
const CARD_NAME: &str = "stationd";
const CARD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct StructuredGateway {
    pub codec: Arc<StructuredCodec>,
    pub tasks: Arc<TaskTable>,
}

impl StructuredGateway {
    pub fn new(state: AppState) -> Self {
        let tasks = state.tasks.clone();
        Self {
            codec: Arc::new(build_codec(state, tasks.clone())),
            tasks,
        }
    }
}

fn build_codec(state: AppState, tasks: Arc<TaskTable>) -> StructuredCodec {
    let mut codec = StructuredCodec::new();

    codec.register(
        "agent/getAuthenticatedExtendedCard",
        Arc::new(|_params: Value| {
            Box::pin(async move {
                Ok(json!({
                    "name": CARD_NAME,
                    "description": "Backend orchestration core for an interactive agent workstation",
                    "version": CARD_VERSION,
                    "capabilities": ["chat", "terminal", "browser", "tools", "memory"],
                    "skills": [],
                }))
            })
        }),
    );

    {
        let state = state.clone();
        codec.register(
            "message/send",
            Arc::new(move |params: Value| {
                let state = state.clone();
                Box::pin(async move { handle_message_send(state, params).await })
            }),
        );
    }

    {
        let state = state.clone();
        let tasks = tasks.clone();
        codec.register(
            "message/stream",
            Arc::new(move |params: Value| {
                let state = state.clone();
                let tasks = tasks.clone();
                Box::pin(async move { handle_message_stream(state, tasks, params).await })
            }),
        );
    }

    {
        let tasks = tasks.clone();
        codec.register(
            "tasks/get",
            Arc::new(move |params: Value| {
                let tasks = tasks.clone();
                Box::pin(async move { handle_tasks_get(tasks, params) })
            }),
        );
    }

    {
        let tasks = tasks.clone();
        codec.register(
            "tasks/list",
            Arc::new(move |_params: Value| {
                let tasks = tasks.clone();
                Box::pin(async move { Ok(json!({ "tasks": tasks.list() })) })
            }),
        );
    }

    {
        let tasks = tasks.clone();
        codec.register(
            "tasks/cancel",
            Arc::new(move |params: Value| {
                let tasks = tasks.clone();
                Box::pin(async move { handle_tasks_cancel(tasks, params) })
            }),
        );
    }

    {
        let state = state.clone();
        codec.register(
            "browser/navigate",
            Arc::new(move |params: Value| {
                let state = state.clone();
                Box::pin(async move { handle_browser_navigate(state, params).await })
            }),
        );
    }

    {
        let state = state.clone();
        codec.register(
            "browser/click",
            Arc::new(move |params: Value| {
                let state = state.clone();
                Box::pin(async move { handle_browser_click(state, params).await })
            }),
        );
    }

    {
        let state = state.clone();
        codec.register(
            "terminal/execute",
            Arc::new(move |params: Value| {
                let state = state.clone();
                Box::pin(async move { handle_terminal_execute(state, params).await })
            }),
        );
    }

    codec.register(
        "memory/query",
        Arc::new(|_params: Value| Box::pin(async move { Ok(json!({ "results": [] })) })),
    );

    {
        let state = state.clone();
        codec.register(
            "mcp/listTools",
            Arc::new(move |params: Value| {
                let state = state.clone();
                Box::pin(async move { handle_mcp_list_tools(state, params).await })
            }),
        );
    }

    {
        codec.register(
            "mcp/callTool",
            Arc::new(move |params: Value| {
                let state = state.clone();
                Box::pin(async move { handle_mcp_call_tool(state, params).await })
            }),
        );
    }

    codec
}

fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, StructuredError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StructuredError::invalid_params(format!("missing or non-string field: {field}")))
}

async fn handle_message_send(state: AppState, params: Value) -> Result<Value, StructuredError> {
    let parts = params
        .get("message")
        .and_then(|m| m.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| StructuredError::invalid_params("message.parts must be an array"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    let request = CompletionRequest::new(vec![ModelMessage::user(text)], 0.7);
    let response = state
        .model
        .complete(request)
        .await
        .map_err(|e| StructuredError::internal_error(e.to_string()))?;

    Ok(json!({
        "role": "assistant",
        "parts": [{ "type": "text", "text": response.content }],
    }))
}

async fn handle_message_stream(state: AppState, tasks: Arc<TaskTable>, params: Value) -> Result<Value, StructuredError> {
    let task_id = params
        .get("task_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tasks.get_or_create(&task_id);
    tasks.set_state(&task_id, TaskState::Working);

    let command = params
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let spawned_id = task_id.clone();
    let spawned_tasks = tasks.clone();
    tokio::spawn(async move {
        let request = CompletionRequest::new(vec![ModelMessage::user(command)], 0.7);
        match state.model.complete(request).await {
            Ok(resp) => spawned_tasks.set_result(&spawned_id, TaskState::Done, resp.content),
            Err(e) => spawned_tasks.set_result(&spawned_id, TaskState::Failed, e.to_string()),
        }
    });

    Ok(json!({ "task_id": task_id, "state": "working" }))
}

fn handle_tasks_get(tasks: Arc<TaskTable>, params: Value) -> Result<Value, StructuredError> {
    let task_id = require_str(&params, "task_id")?;
    match tasks.get(task_id) {
        Some(task) => Ok(serde_json::to_value(task).unwrap()),
        None => Err(StructuredError::invalid_params(format!("unknown task_id: {task_id}"))),
    }
}

/// The closed task-state set has no "cancelled" state; a cancel request
/// settles the task into `failed`, the same terminal state a cancelled
/// operation would reach on its own.
fn handle_tasks_cancel(tasks: Arc<TaskTable>, params: Value) -> Result<Value, StructuredError> {
    let task_id = require_str(&params, "task_id")?;
    if tasks.set_state(task_id, TaskState::Failed) {
        Ok(json!({ "task_id": task_id, "state": "failed" }))
    } else {
        Err(StructuredError::invalid_params(format!("unknown task_id: {task_id}")))
    }
}

async fn handle_browser_navigate(state: AppState, params: Value) -> Result<Value, StructuredError> {
    let url = require_str(&params, "url")?;
    state
        .browser
        .initialize()
        .await
        .map_err(|e| StructuredError::internal_error(e.to_string()))?;
    state
        .browser
        .navigate(url)
        .await
        .map_err(|e| StructuredError::internal_error(e.to_string()))?;
    Ok(json!({ "success": true, "url": url }))
}

async fn handle_browser_click(state: AppState, params: Value) -> Result<Value, StructuredError> {
    let index = params
        .get("element_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| StructuredError::invalid_params("missing numeric field: element_id"))?;
    state
        .browser
        .click(index as usize)
        .await
        .map_err(|e| StructuredError::internal_error(e.to_string()))?;
    Ok(json!({ "success": true }))
}

async fn handle_terminal_execute(state: AppState, params: Value) -> Result<Value, StructuredError> {
    let command = require_str(&params, "command")?;
    let session_id = params
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match state
        .terminal
        .execute(&session_id, command, CommandSource::Ai, state.command_timeout)
        .await
    {
        Ok(lines) => Ok(json!({
            "success": true,
            "output": lines.join("\n") + if lines.is_empty() { "" } else { "\n" },
            "exit_code": 0,
        })),
        Err(e) => Ok(json!({
            "success": false,
            "output": "",
            "error": e.to_string(),
        })),
    }
}

async fn handle_mcp_list_tools(state: AppState, params: Value) -> Result<Value, StructuredError> {
    let server = require_str(&params, "server")?;
    state
        .mcp
        .list_tools(server)
        .await
        .map_err(|e| StructuredError::internal_error(e.to_string()))
}

async fn handle_mcp_call_tool(state: AppState, params: Value) -> Result<Value, StructuredError> {
    let server = require_str(&params, "server")?;
    let tool = require_str(&params, "tool")?;
    let args = params.get("args").cloned().unwrap_or(Value::Null);
    state
        .mcp
        .call_tool(server, tool, args)
        .await
        .map_err(|e| StructuredError::internal_error(e.to_string()))
}

pub async fn structured_ws_handler(ws: WebSocketUpgrade, State(gateway): State<StructuredGateway>) -> Response {
    ws.on_upgrade(move |socket| handle_structured_socket(socket, gateway))
}

async fn handle_structured_socket(socket: WebSocket, gateway: StructuredGateway) {
    let (sink, mut stream) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    let writer = tokio::spawn(structured_writer_loop(sink, outbox_rx));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                // Spawned so a slow handler (e.g. a long terminal/execute)
                // can't block this connection from processing the next frame.
                let codec = gateway.codec.clone();
                let outbox_tx = outbox_tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = codec.handle_raw(&text).await {
                        if let Ok(text) = serde_json::to_string(&response) {
                            let _ = outbox_tx.send(text).await;
                        }
                    }
                });
            }
            Ok(WsMessage::Pong(_)) => {}
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    writer.abort();
    debug!("structured connection closed");
}

async fn structured_writer_loop(
    mut sink: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut outbox_rx: mpsc::Receiver<String>,
) {
    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
    loop {
        tokio::select! {
            maybe_text = outbox_rx.recv() => {
                let Some(text) = maybe_text else { break };
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = ping_ticker.tick() => {
                if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::mock::ScriptedMockProvider;
    use core_terminal::{Executor, ShellSessionManager};
    use std::time::Duration as StdDuration;

    async fn test_state(model: Arc<dyn core_model::ModelProvider>) -> AppState {
        AppState {
            model,
            mcp: Arc::new(core_mcp::McpClient::spawn_all(&core_config::McpManifest::default()).await),
            terminal: Arc::new(Executor::new(ShellSessionManager::new("/bin/sh", 10))),
            browser: Arc::new(core_browser::BrowserManager::new(true)),
            memory: Arc::new(core_memory::TaskMemoryRegistry::new()),
            tasks: crate::task_table::TaskTable::new(),
            readiness: crate::readiness::Readiness::new(),
            command_timeout: StdDuration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let gateway = StructuredGateway::new(test_state(Arc::new(ScriptedMockProvider::new(vec![]))).await);
        let resp = gateway
            .codec
            .handle_raw(r#"{"version":"2.0","id":7,"method":"does/notExist"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, StructuredError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn message_send_calls_the_model() {
        let gateway = StructuredGateway::new(
            test_state(Arc::new(ScriptedMockProvider::new(vec!["hi there".to_string()]))).await,
        );
        let raw = r#"{"version":"2.0","id":1,"method":"message/send","params":{"message":{"role":"user","parts":[{"type":"text","text":"hello"}]}}}"#;
        let resp = gateway.codec.handle_raw(raw).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["role"], "assistant");
        assert_eq!(result["parts"][0]["text"], "hi there");
    }

    #[tokio::test]
    async fn terminal_execute_runs_a_real_command() {
        let gateway = StructuredGateway::new(test_state(Arc::new(ScriptedMockProvider::new(vec![]))).await);
        let raw = r#"{"version":"2.0","id":2,"method":"terminal/execute","params":{"command":"echo foo","session_id":"s1"}}"#;
        let resp = gateway.codec.handle_raw(raw).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["success"], true);
        assert!(result["output"].as_str().unwrap().contains("foo"));
        assert_eq!(result["exit_code"], 0);
    }

    #[tokio::test]
    async fn tasks_get_on_unknown_id_is_invalid_params() {
        let gateway = StructuredGateway::new(test_state(Arc::new(ScriptedMockProvider::new(vec![]))).await);
        let raw = r#"{"version":"2.0","id":3,"method":"tasks/get","params":{"task_id":"nope"}}"#;
        let resp = gateway.codec.handle_raw(raw).await.unwrap();
        assert_eq!(resp.error.unwrap().code, StructuredError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn message_stream_registers_and_tasks_list_shows_it() {
        let gateway = StructuredGateway::new(test_state(Arc::new(ScriptedMockProvider::new(vec!["done".to_string()]))).await);
        let raw = r#"{"version":"2.0","id":4,"method":"message/stream","params":{"task_id":"t1","command":"go"}}"#;
        let resp = gateway.codec.handle_raw(raw).await.unwrap();
        assert_eq!(resp.result.unwrap()["state"], "working");

        let list_raw = r#"{"version":"2.0","id":5,"method":"tasks/list"}"#;
        let resp = gateway.codec.handle_raw(list_raw).await.unwrap();
        let tasks = resp.result.unwrap()["tasks"].as_array().unwrap().len();
        assert_eq!(tasks, 1);
    }

    #[tokio::test]
    async fn tasks_cancel_settles_into_failed_state() {
        let gateway = StructuredGateway::new(test_state(Arc::new(ScriptedMockProvider::new(vec![]))).await);
        gateway.tasks.get_or_create("t1");

        let raw = r#"{"version":"2.0","id":8,"method":"tasks/cancel","params":{"task_id":"t1"}}"#;
        let resp = gateway.codec.handle_raw(raw).await.unwrap();
        assert_eq!(resp.result.unwrap()["state"], "failed");

        let get_raw = r#"{"version":"2.0","id":9,"method":"tasks/get","params":{"task_id":"t1"}}"#;
        let resp = gateway.codec.handle_raw(get_raw).await.unwrap();
        assert_eq!(resp.result.unwrap()["state"], "failed");
    }

    #[tokio::test]
    async fn memory_query_returns_empty_results() {
        let gateway = StructuredGateway::new(test_state(Arc::new(ScriptedMockProvider::new(vec![]))).await);
        let raw = r#"{"version":"2.0","id":6,"method":"memory/query","params":{"query":"anything"}}"#;
        let resp = gateway.codec.handle_raw(raw).await.unwrap();
        assert_eq!(resp.result.unwrap()["results"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn notification_without_id_produces_no_response() {
        let gateway = StructuredGateway::new(test_state(Arc::new(ScriptedMockProvider::new(vec![]))).await);
        let raw = r#"{"version":"2.0","method":"message/stream","params":{"task_id":"t1"}}"#;
        assert!(gateway.codec.handle_raw(raw).await.is_none());
    }
}
