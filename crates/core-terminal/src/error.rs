// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to open pseudo-terminal: {0}")]
    OpenPty(#[source] anyhow::Error),

    #[error("failed to spawn shell: {0}")]
    SpawnShell(#[source] anyhow::Error),

    #[error("failed to write to pty: {0}")]
    Write(#[source] std::io::Error),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("command did not complete within the deadline")]
    Timeout,

    #[error("session limit reached ({0} sessions)")]
    SessionLimitReached(usize),
}
