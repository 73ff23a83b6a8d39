// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of chat-endpoint envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserCommand,
    AgentResponseChunk,
    AgentResponseComplete,
    AgentStatus,
    TerminalOutput,
    BrowserUpdate,
    WatchdogAlert,
    SystemEvent,
    Error,
    Heartbeat,
    HeartbeatAck,
}

/// The chat-endpoint envelope. `id` is the client-visible correlation key
/// when supplied by the caller; the server assigns one otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    /// Build an envelope with a server-assigned id and the current time.
    pub fn new(kind: MessageType, source: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            timestamp: Utc::now(),
            source: source.into(),
            payload,
            metadata: None,
        }
    }

    /// Build an envelope that correlates with an existing id (e.g. an
    /// `agent_response_chunk` replying to the `user_command` that started
    /// the stream).
    pub fn correlated(id: impl Into<String>, kind: MessageType, source: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            timestamp: Utc::now(),
            source: source.into(),
            payload,
            metadata: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_field_is_snake_case_on_the_wire() {
        let msg = Message::new(MessageType::AgentResponseChunk, "core", serde_json::json!({}));
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "agent_response_chunk");
    }

    #[test]
    fn correlated_message_preserves_caller_id() {
        let msg = Message::correlated("abc-123", MessageType::AgentResponseComplete, "core", serde_json::json!({}));
        assert_eq!(msg.id, "abc-123");
    }

    #[test]
    fn round_trips_through_json() {
        let msg = Message::new(MessageType::Heartbeat, "client", serde_json::json!(null));
        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back.kind, MessageType::Heartbeat);
    }
}
