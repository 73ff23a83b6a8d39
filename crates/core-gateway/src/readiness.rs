// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Tracks which components have completed initialization. `core-model`,
/// `core-terminal`, and `core-memory` are ready as soon as they are
/// constructed (no asynchronous setup); `core-browser`'s lazy launch and
/// `core-mcp`'s provider spawn each flip their gate once that work finishes.
#[derive(Default)]
pub struct Readiness {
    model: AtomicBool,
    mcp: AtomicBool,
    terminal: AtomicBool,
    browser: AtomicBool,
    memory: AtomicBool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessSnapshot {
    pub model: bool,
    pub mcp: bool,
    pub terminal: bool,
    pub browser: bool,
    pub memory: bool,
    pub ready: bool,
}

impl Readiness {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_model_ready(&self) {
        self.model.store(true, Ordering::SeqCst);
    }
    pub fn mark_mcp_ready(&self) {
        self.mcp.store(true, Ordering::SeqCst);
    }
    pub fn mark_terminal_ready(&self) {
        self.terminal.store(true, Ordering::SeqCst);
    }
    pub fn mark_browser_ready(&self) {
        self.browser.store(true, Ordering::SeqCst);
    }
    pub fn mark_memory_ready(&self) {
        self.memory.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        let model = self.model.load(Ordering::SeqCst);
        let mcp = self.mcp.load(Ordering::SeqCst);
        let terminal = self.terminal.load(Ordering::SeqCst);
        let browser = self.browser.load(Ordering::SeqCst);
        let memory = self.memory.load(Ordering::SeqCst);
        ReadinessSnapshot {
            model,
            mcp,
            terminal,
            browser,
            memory,
            ready: model && mcp && terminal && browser && memory,
        }
    }
}

/// `GET /healthz` — 200 once every component gate is set, 503 otherwise.
pub async fn healthz(readiness: axum::extract::State<Arc<Readiness>>) -> Response {
    let snapshot = readiness.snapshot();
    let status = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot)).into_response()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_every_gate_is_set() {
        let readiness = Readiness::new();
        assert!(!readiness.snapshot().ready);
        readiness.mark_model_ready();
        readiness.mark_mcp_ready();
        readiness.mark_terminal_ready();
        readiness.mark_browser_ready();
        assert!(!readiness.snapshot().ready);
        readiness.mark_memory_ready();
        assert!(readiness.snapshot().ready);
    }
}
