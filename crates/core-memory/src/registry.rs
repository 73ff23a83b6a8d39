// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::task::TaskMemory;

/// Owns every live task's scratch memory, keyed by task id. A plain
/// `HashMap` behind a single `RwLock` is enough: task creation/eviction is
/// rare next to the in-task append traffic, which is serialized by each
/// [`TaskMemory`]'s own mutex instead.
pub struct TaskMemoryRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskMemory>>>,
}

impl TaskMemoryRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new task's memory, replacing any existing one under the
    /// same id.
    pub async fn create_task(&self, id: impl Into<String>) -> Arc<TaskMemory> {
        let id = id.into();
        let memory = Arc::new(TaskMemory::new(id.clone()));
        self.tasks.write().await.insert(id, memory.clone());
        memory
    }

    /// Return the task's memory, creating it on first reference.
    pub async fn get_or_create_task(&self, id: &str) -> Arc<TaskMemory> {
        if let Some(memory) = self.tasks.read().await.get(id) {
            return memory.clone();
        }

        let mut tasks = self.tasks.write().await;
        if let Some(memory) = tasks.get(id) {
            return memory.clone();
        }
        let memory = Arc::new(TaskMemory::new(id.to_string()));
        tasks.insert(id.to_string(), memory.clone());
        memory
    }

    pub async fn get(&self, id: &str) -> Option<Arc<TaskMemory>> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<TaskMemory>> {
        self.tasks.write().await.remove(id)
    }

    pub async fn task_ids(&self) -> Vec<String> {
        self.tasks.read().await.keys().cloned().collect()
    }

    /// Evict every task whose memory has not been touched within `max_age`.
    /// Returns the ids that were evicted.
    pub async fn cleanup_old_tasks(&self, max_age: Duration) -> Vec<String> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let mut tasks = self.tasks.write().await;
        let stale: Vec<String> = tasks
            .iter()
            .filter(|(_, memory)| memory.last_accessed() < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            tasks.remove(id);
        }
        stale
    }
}

impl Default for TaskMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let registry = TaskMemoryRegistry::new();
        let a = registry.get_or_create_task("t1").await;
        let b = registry.get_or_create_task("t1").await;
        assert!(StdArc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn create_task_replaces_existing_memory() {
        let registry = TaskMemoryRegistry::new();
        let a = registry.get_or_create_task("t1").await;
        a.add_perception("first life");
        let b = registry.create_task("t1").await;
        assert!(b.perceptions().is_empty());
    }

    #[tokio::test]
    async fn remove_drops_a_task() {
        let registry = TaskMemoryRegistry::new();
        registry.get_or_create_task("t1").await;
        assert!(registry.remove("t1").await.is_some());
        assert!(registry.get("t1").await.is_none());
    }

    #[tokio::test]
    async fn cleanup_evicts_only_stale_tasks() {
        let registry = TaskMemoryRegistry::new();
        registry.get_or_create_task("fresh").await;
        let stale = registry.get_or_create_task("stale").await;

        // Force the stale task's last_accessed into the past without
        // sleeping the test thread for real wall-clock time.
        stale.backdate_last_accessed(chrono::Duration::hours(2));

        let evicted = registry.cleanup_old_tasks(Duration::from_secs(3600)).await;
        assert_eq!(evicted, vec!["stale".to_string()]);
        assert!(registry.get("fresh").await.is_some());
        assert!(registry.get("stale").await.is_none());
    }
}
