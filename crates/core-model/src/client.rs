// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use core_config::Config;

use crate::decode::{drain_complete_lines, extract_message_content};
use crate::error::UpstreamError;
use crate::provider::ModelProvider;
use crate::types::{CompletionRequest, FullResponse, Message, ResponseEvent, Role};

/// Client for a single configurable OpenAI-compatible upstream endpoint.
///
/// Unlike a multi-provider router, this client always targets the one
/// `upstream_host`/`upstream_model` pair named by configuration; callers that
/// need a different model construct a second client.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    embed_model: String,
}

impl UpstreamClient {
    pub fn new(cfg: &Config) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.upstream_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.upstream_host.trim_end_matches('/').to_string(),
            model: cfg.upstream_model.clone(),
            embed_model: cfg.upstream_embed_model.clone(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    fn chat_body(&self, req: &CompletionRequest, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": req.messages.iter().map(message_to_json).collect::<Vec<_>>(),
            "temperature": req.temperature,
            "stream": stream,
        })
    }
}

#[async_trait]
impl ModelProvider for UpstreamClient {
    /// Non-streaming completion: blocks until the upstream returns the full
    /// message body.
    async fn complete(&self, req: CompletionRequest) -> Result<FullResponse, UpstreamError> {
        let resp = self
            .http
            .post(self.chat_url())
            .json(&self.chat_body(&req, false))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await?;
        let content = extract_message_content(&body)?;
        Ok(FullResponse { content })
    }

    /// Streaming completion. Invokes `sink` once per non-empty text delta.
    ///
    /// If `sink` returns an error the request is aborted: the in-flight body
    /// is dropped without decoding the remainder, and the sink's error is
    /// propagated to the caller.
    async fn complete_stream(
        &self,
        req: CompletionRequest,
        mut sink: Box<dyn FnMut(String) -> Result<(), String> + Send>,
    ) -> Result<(), UpstreamError> {
        let resp = self
            .http
            .post(self.chat_url())
            .json(&self.chat_body(&req, true))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut byte_stream = resp.bytes_stream();
        let mut buf = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            buf.push_str(&String::from_utf8_lossy(&chunk));

            for event in drain_complete_lines(&mut buf) {
                match event? {
                    ResponseEvent::TextDelta(text) => {
                        if let Err(reason) = sink(text) {
                            debug!("stream sink aborted request: {reason}");
                            return Err(UpstreamError::SinkAborted(reason));
                        }
                    }
                    ResponseEvent::Done => return Ok(()),
                }
            }
        }

        warn!("upstream closed the stream without a [DONE] sentinel");
        Ok(())
    }

    /// Batched embedding call: one request per input, failing fast on the
    /// first error.
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, UpstreamError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for input in inputs {
            let resp = self
                .http
                .post(self.embeddings_url())
                .json(&json!({ "model": self.embed_model, "input": input }))
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let body: Value = resp.json().await?;
            let vector = body["data"][0]["embedding"]
                .as_array()
                .ok_or_else(|| {
                    UpstreamError::MalformedFrame(format!("missing data[0].embedding in {body}"))
                })?
                .iter()
                .map(|v| v.as_f64().unwrap_or_default() as f32)
                .collect();
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

fn message_to_json(m: &Message) -> Value {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    json!({ "role": role, "content": m.content })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_carries_temperature_and_model() {
        let mut cfg = Config::default();
        cfg.upstream_model = "test-model".into();
        let client = UpstreamClient::new(&cfg).unwrap();
        let req = CompletionRequest::new(vec![Message::user("hi")], 0.2);
        let body = client.chat_body(&req, true);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn urls_are_derived_from_base_host() {
        let mut cfg = Config::default();
        cfg.upstream_host = "http://example.test:11434/".into();
        let client = UpstreamClient::new(&cfg).unwrap();
        assert_eq!(client.chat_url(), "http://example.test:11434/v1/chat/completions");
        assert_eq!(client.embeddings_url(), "http://example.test:11434/v1/embeddings");
    }
}
