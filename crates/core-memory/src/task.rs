// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::MemoryEntry;

/// A serializable snapshot of one task's memory, suitable for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTrace {
    pub task_id: String,
    pub perceptions: Vec<MemoryEntry<String>>,
    pub reasoning_branches: Vec<MemoryEntry<String>>,
    pub actions: Vec<MemoryEntry<String>>,
    pub reflections: Vec<MemoryEntry<String>>,
    /// Screenshot bytes, base64-encoded for JSON transport.
    pub screenshots: Vec<MemoryEntry<String>>,
    pub context: HashMap<String, Value>,
    pub last_accessed: DateTime<Utc>,
}

struct TaskState {
    perceptions: Vec<MemoryEntry<String>>,
    reasoning_branches: Vec<MemoryEntry<String>>,
    actions: Vec<MemoryEntry<String>>,
    reflections: Vec<MemoryEntry<String>>,
    screenshots: Vec<MemoryEntry<Vec<u8>>>,
    context: HashMap<String, Value>,
    next_id: u64,
    last_accessed: DateTime<Utc>,
}

/// Scratch memory owned by exactly one task: five ordered append-only lists
/// plus an opaque context map. All mutation is serialized by a single
/// internal mutex; reads return defensive copies.
pub struct TaskMemory {
    id: String,
    state: Mutex<TaskState>,
}

impl TaskMemory {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(TaskState {
                perceptions: Vec::new(),
                reasoning_branches: Vec::new(),
                actions: Vec::new(),
                reflections: Vec::new(),
                screenshots: Vec::new(),
                context: HashMap::new(),
                next_id: 0,
                last_accessed: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn next_id(state: &mut TaskState) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        state.last_accessed = Utc::now();
        id
    }

    pub fn add_perception(&self, content: impl Into<String>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        state.perceptions.push(MemoryEntry::new(id, content.into()));
        id
    }

    pub fn add_reasoning(&self, content: impl Into<String>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        state.reasoning_branches.push(MemoryEntry::new(id, content.into()));
        id
    }

    pub fn add_action(&self, content: impl Into<String>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        state.actions.push(MemoryEntry::new(id, content.into()));
        id
    }

    pub fn add_reflection(&self, content: impl Into<String>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        state.reflections.push(MemoryEntry::new(id, content.into()));
        id
    }

    pub fn add_screenshot(&self, png: Vec<u8>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        state.screenshots.push(MemoryEntry::new(id, png));
        id
    }

    pub fn perceptions(&self) -> Vec<MemoryEntry<String>> {
        self.touch_and_clone(|s| s.perceptions.clone())
    }

    pub fn reasoning_branches(&self) -> Vec<MemoryEntry<String>> {
        self.touch_and_clone(|s| s.reasoning_branches.clone())
    }

    pub fn actions(&self) -> Vec<MemoryEntry<String>> {
        self.touch_and_clone(|s| s.actions.clone())
    }

    pub fn reflections(&self) -> Vec<MemoryEntry<String>> {
        self.touch_and_clone(|s| s.reflections.clone())
    }

    pub fn screenshots(&self) -> Vec<MemoryEntry<Vec<u8>>> {
        self.touch_and_clone(|s| s.screenshots.clone())
    }

    fn touch_and_clone<T>(&self, f: impl FnOnce(&TaskState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        state.last_accessed = Utc::now();
        f(&state)
    }

    pub fn set_context(&self, key: impl Into<String>, value: Value) {
        let mut state = self.state.lock().unwrap();
        state.context.insert(key.into(), value);
        state.last_accessed = Utc::now();
    }

    pub fn get_context(&self, key: &str) -> Option<Value> {
        self.touch_and_clone(|s| s.context.get(key).cloned())
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().last_accessed
    }

    #[cfg(test)]
    pub fn backdate_last_accessed(&self, by: chrono::Duration) {
        let mut state = self.state.lock().unwrap();
        state.last_accessed = state.last_accessed - by;
    }

    /// A serializable snapshot of every list, with screenshot bytes
    /// base64-encoded for JSON transport. Does not advance `last_accessed`
    /// beyond whatever the constituent reads already did.
    pub fn export_trace(&self) -> TaskTrace {
        let state = self.state.lock().unwrap();
        TaskTrace {
            task_id: self.id.clone(),
            perceptions: state.perceptions.clone(),
            reasoning_branches: state.reasoning_branches.clone(),
            actions: state.actions.clone(),
            reflections: state.reflections.clone(),
            screenshots: state
                .screenshots
                .iter()
                .map(|e| MemoryEntry {
                    id: e.id,
                    created_at: e.created_at,
                    data: base64::engine::general_purpose::STANDARD.encode(&e.data),
                })
                .collect(),
            context: state.context.clone(),
            last_accessed: state.last_accessed,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_are_ordered_and_ids_are_monotonic() {
        let mem = TaskMemory::new("t1");
        let id1 = mem.add_perception("saw a button");
        let id2 = mem.add_perception("saw a form");
        assert!(id2 > id1);
        let perceptions = mem.perceptions();
        assert_eq!(perceptions.len(), 2);
        assert_eq!(perceptions[0].data, "saw a button");
        assert_eq!(perceptions[1].data, "saw a form");
    }

    #[test]
    fn context_round_trips() {
        let mem = TaskMemory::new("t1");
        mem.set_context("goal", serde_json::json!("log in"));
        assert_eq!(mem.get_context("goal"), Some(serde_json::json!("log in")));
        assert_eq!(mem.get_context("missing"), None);
    }

    #[test]
    fn reads_return_defensive_copies() {
        let mem = TaskMemory::new("t1");
        mem.add_action("click button");
        let snapshot = mem.actions();
        mem.add_action("type text");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(mem.actions().len(), 2);
    }

    #[test]
    fn export_trace_base64_encodes_screenshots() {
        let mem = TaskMemory::new("t1");
        mem.add_screenshot(vec![0x89, 0x50, 0x4e, 0x47]);
        let trace = mem.export_trace();
        assert_eq!(trace.screenshots.len(), 1);
        assert_eq!(trace.screenshots[0].data, "iVBORw==");
    }

    #[test]
    fn reads_advance_last_accessed() {
        let mem = TaskMemory::new("t1");
        let before = mem.last_accessed();
        std::thread::sleep(std::time::Duration::from_millis(5));
        mem.perceptions();
        assert!(mem.last_accessed() >= before);
    }
}
