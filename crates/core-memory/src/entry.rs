// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One append-only entry in a task memory list. `id` is monotonic within
/// the owning list; readers observing `id <= N` at time `t` will still
/// observe it at any later time — entries are never mutated or removed
/// except by whole-task eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry<T> {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub data: T,
}

impl<T> MemoryEntry<T> {
    pub fn new(id: u64, data: T) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            data,
        }
    }
}
