// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::types::{CompletionRequest, FullResponse};

/// Abstraction over the upstream language model boundary.
///
/// [`UpstreamClient`](crate::UpstreamClient) is the production
/// implementation; tests substitute [`crate::mock::MockModelProvider`] so
/// that gateway and session logic can be exercised without a live endpoint.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<FullResponse, UpstreamError>;

    /// Streaming completion. Invokes `sink` once per non-empty text delta;
    /// a sink error aborts the in-flight request.
    async fn complete_stream(
        &self,
        req: CompletionRequest,
        sink: Box<dyn FnMut(String) -> Result<(), String> + Send>,
    ) -> Result<(), UpstreamError>;

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, UpstreamError>;
}
