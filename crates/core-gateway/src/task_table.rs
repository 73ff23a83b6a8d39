// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Task bookkeeping shared by the chat and structured endpoints: both
//! `handle_user_command` and `message/stream` create a task the first time
//! a client kicks off work, and `tasks/get`/`tasks/list`/`tasks/cancel`
//! read and mutate that same table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A task's lifecycle is linear except `working` and `paused`, which loop
/// back on each other; `failed` and `done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Idle,
    Working,
    Paused,
    Failed,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// A plain map behind an `RwLock`: task creation/mutation is infrequent
/// relative to `tasks/get`/`tasks/list` lookups.
#[derive(Default)]
pub struct TaskTable {
    tasks: RwLock<HashMap<String, Task>>,
}

impl TaskTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates the task in `idle` state if this is the first reference to
    /// `id`; otherwise returns the existing record unchanged.
    pub fn get_or_create(&self, id: &str) -> Task {
        let mut tasks = self.tasks.write().unwrap();
        tasks
            .entry(id.to_string())
            .or_insert_with(|| {
                let now = Utc::now();
                Task {
                    id: id.to_string(),
                    state: TaskState::Idle,
                    created_at: now,
                    updated_at: now,
                    result: None,
                }
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().unwrap().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Task> {
        self.tasks.read().unwrap().values().cloned().collect()
    }

    pub fn set_state(&self, id: &str, state: TaskState) -> bool {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.get_mut(id) {
            Some(task) => {
                task.state = state;
                task.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn set_result(&self, id: &str, state: TaskState, result: String) {
        let mut tasks = self.tasks.write().unwrap();
        if let Some(task) = tasks.get_mut(id) {
            task.state = state;
            task.result = Some(result);
            task.updated_at = Utc::now();
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let table = TaskTable::new();
        let a = table.get_or_create("t1");
        let b = table.get_or_create("t1");
        assert_eq!(a.created_at, b.created_at);
    }

    #[test]
    fn set_state_on_unknown_task_is_a_noop() {
        let table = TaskTable::new();
        assert!(!table.set_state("nope", TaskState::Working));
    }

    #[test]
    fn set_result_marks_terminal_state_and_records_output() {
        let table = TaskTable::new();
        table.get_or_create("t1");
        table.set_result("t1", TaskState::Done, "ok".to_string());
        let task = table.get("t1").unwrap();
        assert_eq!(task.state, TaskState::Done);
        assert_eq!(task.result.as_deref(), Some("ok"));
    }
}
