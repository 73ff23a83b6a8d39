// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors surfaced by the upstream-LM client.
///
/// Maps onto spec §7's "Upstream errors" classification: every variant here
/// is surfaced as a single terminal error to the caller without tearing down
/// the client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("network error contacting upstream: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream returned non-2xx status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response frame: {0}")]
    MalformedFrame(String),

    #[error("stream sink aborted: {0}")]
    SinkAborted(String),

    #[error("request cancelled")]
    Cancelled,
}
