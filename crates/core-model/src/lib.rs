// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Client for the single configurable upstream language model endpoint.
//!
//! Talks the OpenAI-compatible `/v1/chat/completions` and `/v1/embeddings`
//! wire format over HTTP, decoding both the non-streaming JSON body and the
//! line-buffered SSE stream.

mod client;
mod decode;
mod error;
pub mod mock;
mod provider;
mod types;

pub use client::UpstreamClient;
pub use error::UpstreamError;
pub use provider::ModelProvider;
pub use types::{CompletionRequest, FullResponse, Message, ResponseEvent, Role};
