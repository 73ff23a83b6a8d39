// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn tool provider: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to write to provider stdin: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to encode call: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("provider call failed: {code} {message}")]
    CallFailed { code: i64, message: String },

    #[error("provider exited or was closed before a response arrived")]
    ProviderClosed,

    #[error("provider initialization timed out; stderr: {stderr}")]
    InitTimeout { stderr: String },

    #[error("unknown tool provider: {0}")]
    UnknownProvider(String),
}
