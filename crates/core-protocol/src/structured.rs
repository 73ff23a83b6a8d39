// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The structured request/response codec (spec component B). Transport-
//! agnostic: callers feed it a `StructuredCall` and get back an optional
//! `StructuredResponse`. Framing onto a socket lives in `core-gateway`.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::error::StructuredError;

/// A request id: either a string or an integer, per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

/// An inbound structured call. Presence of `id` distinguishes a request
/// (response required) from a notification (no response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredCall {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl StructuredCall {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// The response to a `StructuredCall` that carried an `id`. Carries exactly
/// one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub version: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

impl StructuredResponse {
    pub fn ok(id: Option<RequestId>, result: Value) -> Self {
        Self {
            version: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<RequestId>, error: StructuredError) -> Self {
        Self {
            version: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, StructuredError>> + Send>>;
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Registry of method handlers plus the `Handle` dispatch entry point.
///
/// Handlers run concurrently: `handle` does not serialize calls to distinct
/// methods, nor repeated calls to the same one — each call is driven to
/// completion independently by its caller (typically one `tokio::spawn` per
/// inbound frame in `core-gateway`).
#[derive(Clone, Default)]
pub struct StructuredCodec {
    handlers: HashMap<String, Handler>,
}

impl StructuredCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `method`. Replaces any prior registration.
    pub fn register(&mut self, method: impl Into<String>, handler: Handler) {
        self.handlers.insert(method.into(), handler);
    }

    /// Parse a raw wire frame and dispatch it. Returns `None` for
    /// notifications and for parse failures with no recoverable `id`.
    pub async fn handle_raw(&self, raw: &str) -> Option<StructuredResponse> {
        let call: StructuredCall = match serde_json::from_str(raw) {
            Ok(c) => c,
            Err(e) => {
                return Some(StructuredResponse::err(
                    None,
                    StructuredError::parse_error(e.to_string()),
                ))
            }
        };
        self.handle(call).await
    }

    /// Dispatch an already-parsed call. A panicking handler is recovered
    /// into an internal-error response rather than propagating.
    pub async fn handle(&self, call: StructuredCall) -> Option<StructuredResponse> {
        let id = call.id.clone();
        let is_notification = call.is_notification();

        let Some(handler) = self.handlers.get(&call.method).cloned() else {
            return if is_notification {
                None
            } else {
                Some(StructuredResponse::err(
                    id,
                    StructuredError::method_not_found(&call.method),
                ))
            };
        };

        let params = call.params.unwrap_or(Value::Null);
        let outcome = AssertUnwindSafe(handler(params)).catch_unwind().await;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                let msg = panic_message(&panic);
                error!(method = %call.method, %msg, "structured handler panicked");
                Err(StructuredError::internal_error(msg))
            }
        };

        if is_notification {
            return None;
        }

        Some(match result {
            Ok(value) => StructuredResponse::ok(id, value),
            Err(e) => StructuredResponse::err(id, e),
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(f: impl Fn(Value) -> Result<Value, StructuredError> + Send + Sync + 'static) -> Handler {
        Arc::new(move |params| {
            let result = f(params);
            Box::pin(async move { result })
        })
    }

    #[tokio::test]
    async fn unknown_method_yields_method_not_found() {
        let codec = StructuredCodec::new();
        let call = StructuredCall {
            version: "2.0".into(),
            id: Some(RequestId::Number(1)),
            method: "nope".into(),
            params: None,
        };
        let resp = codec.handle(call).await.unwrap();
        assert_eq!(resp.error.unwrap().code, StructuredError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let mut codec = StructuredCodec::new();
        codec.register("ping", handler(|_| Ok(Value::Bool(true))));
        let call = StructuredCall {
            version: "2.0".into(),
            id: None,
            method: "ping".into(),
            params: None,
        };
        assert!(codec.handle(call).await.is_none());
    }

    #[tokio::test]
    async fn request_with_id_always_gets_a_response() {
        let mut codec = StructuredCodec::new();
        codec.register("echo", handler(Ok));
        let call = StructuredCall {
            version: "2.0".into(),
            id: Some(RequestId::String("x-1".into())),
            method: "echo".into(),
            params: Some(serde_json::json!({"a": 1})),
        };
        let resp = codec.handle(call).await.unwrap();
        assert_eq!(resp.id, Some(RequestId::String("x-1".into())));
        assert_eq!(resp.result.unwrap()["a"], 1);
    }

    #[tokio::test]
    async fn panicking_handler_becomes_internal_error() {
        let mut codec = StructuredCodec::new();
        codec.register(
            "boom",
            Arc::new(|_: Value| -> HandlerFuture { Box::pin(async { panic!("kaboom") }) }),
        );
        let call = StructuredCall {
            version: "2.0".into(),
            id: Some(RequestId::Number(7)),
            method: "boom".into(),
            params: None,
        };
        let resp = codec.handle(call).await.unwrap();
        assert_eq!(resp.error.unwrap().code, StructuredError::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn parse_error_has_null_id() {
        let codec = StructuredCodec::new();
        let resp = codec.handle_raw("not json").await.unwrap();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.unwrap().code, StructuredError::PARSE_ERROR);
    }
}
