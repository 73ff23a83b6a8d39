// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The chat endpoint (component F): a socket hub that streams model
//! completions to the client as they arrive and exposes broadcast
//! primitives for the other components to push unsolicited events.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use core_model::{CompletionRequest, Message as ModelMessage};
use core_protocol::{Message, MessageType};

use crate::hub::{spawn_hub, HubHandle};
use crate::state::AppState;
use crate::task_table::TaskState;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const OUTBOX_CAPACITY: usize = 256;

const SYSTEM_PRIMER: &str =
    "You are the agent running inside the operator's workstation. Respond concisely.";

/// Cheap-to-clone handle combining the chat connection registry with the
/// shared component state. Passed as axum router state.
#[derive(Clone)]
pub struct ChatGateway {
    pub hub: HubHandle<Message>,
    pub state: AppState,
}

impl ChatGateway {
    pub fn new(state: AppState) -> Self {
        Self {
            hub: spawn_hub(),
            state,
        }
    }

    pub async fn broadcast_message(&self, payload: serde_json::Value) {
        self.hub
            .broadcast(Message::new(MessageType::SystemEvent, "server", payload))
            .await;
    }

    pub async fn broadcast_terminal_output(&self, session_id: &str, output: &[String]) {
        let payload = json!({ "session_id": session_id, "output": output });
        self.hub
            .broadcast(Message::new(MessageType::TerminalOutput, "server", payload))
            .await;
    }

    pub async fn broadcast_browser_update(&self, screenshot_png: &[u8], elements: &[core_browser::BrowserElement]) {
        let payload = json!({
            "screenshot_b64": base64_encode(screenshot_png),
            "elements": elements,
        });
        self.hub
            .broadcast(Message::new(MessageType::BrowserUpdate, "server", payload))
            .await;
    }

    pub async fn broadcast_watchdog_alert(&self, kind: &str, title: &str, msg: &str) {
        let payload = json!({ "kind": kind, "title": title, "message": msg });
        self.hub
            .broadcast(Message::new(MessageType::WatchdogAlert, "server", payload))
            .await;
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub async fn chat_ws_handler(ws: WebSocketUpgrade, State(gateway): State<ChatGateway>) -> Response {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, gateway))
}

async fn handle_chat_socket(socket: WebSocket, gateway: ChatGateway) {
    let conn_id = Uuid::new_v4();
    let (outbox_tx, outbox_rx) = mpsc::channel::<Message>(OUTBOX_CAPACITY);
    gateway.hub.register(conn_id, outbox_tx.clone()).await;

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(writer_loop(sink, outbox_rx));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<Message>(&text) {
                Ok(envelope) => dispatch(envelope, conn_id, &outbox_tx, &gateway.state).await,
                Err(e) => {
                    let err = Message::new(
                        MessageType::Error,
                        "server",
                        json!({ "message": format!("invalid message envelope: {e}") }),
                    );
                    let _ = outbox_tx.try_send(err);
                }
            },
            Ok(WsMessage::Pong(_)) => {}
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    gateway.hub.unregister(conn_id).await;
    writer.abort();
    debug!(%conn_id, "chat connection closed");
}

async fn writer_loop(
    mut sink: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut outbox_rx: mpsc::Receiver<Message>,
) {
    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
    loop {
        tokio::select! {
            maybe_msg = outbox_rx.recv() => {
                let Some(msg) = maybe_msg else { break };
                let Ok(text) = serde_json::to_string(&msg) else { continue };
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

async fn dispatch(envelope: Message, conn_id: Uuid, outbox: &mpsc::Sender<Message>, state: &AppState) {
    match envelope.kind {
        MessageType::UserCommand => handle_user_command(envelope, conn_id, outbox.clone(), state.clone()).await,
        MessageType::Heartbeat => {
            let ack = Message::correlated(envelope.id, MessageType::HeartbeatAck, "server", serde_json::Value::Null);
            let _ = outbox.try_send(ack);
        }
        other => {
            debug!(?other, %conn_id, "ignoring unsupported chat message type");
        }
    }
}

async fn handle_user_command(envelope: Message, conn_id: Uuid, outbox: mpsc::Sender<Message>, state: AppState) {
    let Some(command) = envelope.payload.get("command").and_then(|v| v.as_str()) else {
        let err = Message::correlated(
            envelope.id,
            MessageType::Error,
            "server",
            json!({ "message": "user_command requires a string payload.command" }),
        );
        let _ = outbox.try_send(err);
        return;
    };
    let command = command.to_string();
    let correlation_id = envelope.id;
    let task_id = correlation_id.clone();

    // Each user_command starts a task scoped to its own correlation id; the
    // chat socket itself is long-lived and can host many such tasks.
    state.tasks.get_or_create(&task_id);
    state.tasks.set_state(&task_id, TaskState::Working);
    let task_memory = state.memory.get_or_create_task(&task_id).await;
    task_memory.add_perception(command.clone());

    tokio::spawn(async move {
        let request = CompletionRequest::new(
            vec![ModelMessage::system(SYSTEM_PRIMER), ModelMessage::user(command)],
            0.7,
        );

        let accumulated = Arc::new(Mutex::new(String::new()));
        let sink_acc = accumulated.clone();
        let sink_outbox = outbox.clone();
        let sink_id = correlation_id.clone();
        let sink: Box<dyn FnMut(String) -> Result<(), String> + Send> = Box::new(move |delta: String| {
            sink_acc.lock().unwrap().push_str(&delta);
            let chunk = Message::correlated(
                sink_id.clone(),
                MessageType::AgentResponseChunk,
                "agent",
                json!({ "chunk": delta, "complete": false }),
            );
            sink_outbox.try_send(chunk).map_err(|e| e.to_string())
        });

        match state.model.complete_stream(request, sink).await {
            Ok(()) => {
                let full = accumulated.lock().unwrap().clone();
                task_memory.add_action(full.clone());
                state.tasks.set_result(&task_id, TaskState::Done, full.clone());
                let done = Message::correlated(
                    correlation_id,
                    MessageType::AgentResponseComplete,
                    "agent",
                    json!({ "response": full, "complete": true }),
                );
                let _ = outbox.send(done).await;
            }
            Err(e) => {
                warn!(%conn_id, error = %e, "streaming completion failed");
                task_memory.add_reflection(e.to_string());
                state.tasks.set_result(&task_id, TaskState::Failed, e.to_string());
                let err = Message::correlated(
                    correlation_id,
                    MessageType::Error,
                    "server",
                    json!({ "message": e.to_string() }),
                );
                let _ = outbox.send(err).await;
            }
        }
    });
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
