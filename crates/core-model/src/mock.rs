// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Test double for [`crate::ModelProvider`], standing in for a live upstream
//! endpoint in gateway and session unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::provider::ModelProvider;
use crate::types::{CompletionRequest, FullResponse};

/// Echoes the last user message back, prefixed, so tests can assert on a
/// deterministic reply without scripting one.
#[derive(Debug, Default)]
pub struct MockModelProvider;

#[async_trait]
impl ModelProvider for MockModelProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<FullResponse, UpstreamError> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(FullResponse {
            content: format!("echo: {last_user}"),
        })
    }

    async fn complete_stream(
        &self,
        req: CompletionRequest,
        mut sink: Box<dyn FnMut(String) -> Result<(), String> + Send>,
    ) -> Result<(), UpstreamError> {
        let full = self.complete(req).await?;
        for word in full.content.split_inclusive(' ') {
            sink(word.to_string()).map_err(UpstreamError::SinkAborted)?;
        }
        Ok(())
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, UpstreamError> {
        Ok(inputs.into_iter().map(|s| vec![s.len() as f32]).collect())
    }
}

/// Replays a fixed queue of responses, one per `complete`/`complete_stream`
/// call, for tests asserting on a specific multi-turn exchange.
pub struct ScriptedMockProvider {
    queue: Mutex<Vec<String>>,
}

impl ScriptedMockProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            queue: Mutex::new(responses),
        }
    }

    fn next_response(&self) -> Result<String, UpstreamError> {
        let mut queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            return Err(UpstreamError::MalformedFrame(
                "scripted provider exhausted".into(),
            ));
        }
        Ok(queue.remove(0))
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    async fn complete(&self, _req: CompletionRequest) -> Result<FullResponse, UpstreamError> {
        Ok(FullResponse {
            content: self.next_response()?,
        })
    }

    async fn complete_stream(
        &self,
        _req: CompletionRequest,
        mut sink: Box<dyn FnMut(String) -> Result<(), String> + Send>,
    ) -> Result<(), UpstreamError> {
        let content = self.next_response()?;
        sink(content).map_err(UpstreamError::SinkAborted)
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, UpstreamError> {
        Ok(inputs.into_iter().map(|s| vec![s.len() as f32]).collect())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let provider = MockModelProvider;
        let req = CompletionRequest::new(vec![Message::user("ping")], 0.0);
        let resp = provider.complete(req).await.unwrap();
        assert_eq!(resp.content, "echo: ping");
    }

    #[tokio::test]
    async fn scripted_provider_replays_in_fifo_order() {
        let provider = ScriptedMockProvider::new(vec!["first".into(), "second".into()]);
        let req = CompletionRequest::new(vec![Message::user("hi")], 0.0);
        let resp = provider.complete(req).await.unwrap();
        assert_eq!(resp.content, "first");
    }

    #[tokio::test]
    async fn scripted_provider_errors_when_exhausted() {
        let provider = ScriptedMockProvider::new(vec![]);
        let req = CompletionRequest::new(vec![Message::user("hi")], 0.0);
        assert!(provider.complete(req).await.is_err());
    }
}
