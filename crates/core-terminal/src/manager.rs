// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TerminalError;
use crate::session::ShellSession;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns every live shell session, keyed by id. Mutation (create/close) is
/// infrequent relative to command execution, so a single `RwLock` around
/// the map is sufficient — the per-session command mutex is what actually
/// serializes the hot path.
pub struct ShellSessionManager {
    shell: String,
    max_sessions: usize,
    sessions: RwLock<HashMap<String, Arc<ShellSession>>>,
}

impl ShellSessionManager {
    pub fn new(shell: impl Into<String>, max_sessions: usize) -> Self {
        Self {
            shell: shell.into(),
            max_sessions,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session named `id`, creating it if absent.
    pub async fn get_or_create_session(&self, id: &str) -> Result<Arc<ShellSession>, TerminalError> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return Ok(session.clone());
        }
        if sessions.len() >= self.max_sessions {
            return Err(TerminalError::SessionLimitReached(self.max_sessions));
        }

        let session = Arc::new(ShellSession::spawn(id, &self.shell)?);
        sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }

    /// Create a session with a freshly generated id.
    pub async fn create_session(&self) -> Result<Arc<ShellSession>, TerminalError> {
        self.get_or_create_session(&Uuid::new_v4().to_string()).await
    }

    pub async fn execute_in_session(&self, id: &str, command: &str) -> Result<Vec<String>, TerminalError> {
        self.execute_in_session_with_timeout(id, command, DEFAULT_TIMEOUT).await
    }

    pub async fn execute_in_session_with_timeout(
        &self,
        id: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, TerminalError> {
        let session = self.get_or_create_session(id).await?;
        session.execute(command, timeout).await
    }

    pub async fn close(&self, id: &str) -> Result<(), TerminalError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TerminalError::SessionNotFound(id.to_string()))
    }

    pub async fn close_all(&self) {
        self.sessions.write().await.clear();
    }

    pub async fn list_sessions(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
