// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::TerminalError;
use crate::manager::ShellSessionManager;

const HISTORY_CAPACITY: usize = 1000;

/// Who requested a recorded command: the model acting autonomously, or the
/// operator directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Ai,
    User,
}

#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub id: u64,
    pub session_id: String,
    pub command: String,
    pub source: CommandSource,
    pub output: Vec<String>,
    pub error: Option<String>,
    /// Synthesized from the sentinel protocol, not read from the shell:
    /// `Some(0)` once the end sentinel is reached, `None` on a nonzero
    /// exit or a timeout (the two are indistinguishable to the caller).
    pub exit_code: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CommandEntry {
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Wraps a [`ShellSessionManager`], recording every command into a bounded
/// circular history alongside who issued it and how it turned out.
pub struct Executor {
    manager: ShellSessionManager,
    history: Mutex<VecDeque<CommandEntry>>,
    next_id: Mutex<u64>,
}

impl Executor {
    pub fn new(manager: ShellSessionManager) -> Self {
        Self {
            manager,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            next_id: Mutex::new(0),
        }
    }

    pub async fn execute(
        &self,
        session_id: &str,
        command: &str,
        source: CommandSource,
        timeout: Duration,
    ) -> Result<Vec<String>, TerminalError> {
        let start_time = Utc::now();
        let result = self
            .manager
            .execute_in_session_with_timeout(session_id, command, timeout)
            .await;
        let end_time = Utc::now();

        let (output, error, exit_code) = match &result {
            Ok(lines) => (lines.clone(), None, Some(0)),
            Err(e) => (Vec::new(), Some(e.to_string()), None),
        };

        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let entry = CommandEntry {
            id,
            session_id: session_id.to_string(),
            command: command.to_string(),
            source,
            output,
            error,
            exit_code,
            start_time,
            end_time,
        };

        let mut history = self.history.lock().unwrap();
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(entry);

        result
    }

    pub fn history_for_session(&self, session_id: &str) -> Vec<CommandEntry> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn history_for_source(&self, source: CommandSource) -> Vec<CommandEntry> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> HistoryStats {
        let history = self.history.lock().unwrap();
        let total = history.len();
        let failed = history.iter().filter(|e| e.error.is_some()).count();
        HistoryStats {
            total,
            succeeded: total - failed,
            failed,
        }
    }

    pub fn manager(&self) -> &ShellSessionManager {
        &self.manager
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_a_successful_command() {
        let executor = Executor::new(ShellSessionManager::new("/bin/sh", 10));
        executor
            .execute("s1", "echo hi", CommandSource::User, Duration::from_secs(5))
            .await
            .unwrap();
        let stats = executor.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn records_a_failed_command() {
        let executor = Executor::new(ShellSessionManager::new("/bin/sh", 10));
        let _ = executor
            .execute("s1", "false", CommandSource::Ai, Duration::from_millis(200))
            .await;
        let stats = executor.stats();
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn filters_history_by_session_and_source() {
        let executor = Executor::new(ShellSessionManager::new("/bin/sh", 10));
        executor
            .execute("s1", "echo a", CommandSource::User, Duration::from_secs(5))
            .await
            .unwrap();
        executor
            .execute("s2", "echo b", CommandSource::Ai, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(executor.history_for_session("s1").len(), 1);
        assert_eq!(executor.history_for_source(CommandSource::Ai).len(), 1);
    }
}
