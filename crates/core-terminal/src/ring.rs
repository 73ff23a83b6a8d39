// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Mutex;

/// Line-oriented ring buffer holding the last `capacity` lines of raw pty
/// output. Reads are never serialized against the session's command mutex —
/// only appends (from the reader thread) and snapshots (from waiters) touch
/// the same lock, each briefly.
pub struct OutputRing {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push_line(&self, line: String) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// A defensive copy of the buffer's current contents, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().cloned().collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_line_past_capacity() {
        let ring = OutputRing::new(2);
        ring.push_line("a".into());
        ring.push_line("b".into());
        ring.push_line("c".into());
        assert_eq!(ring.snapshot(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn snapshot_is_a_defensive_copy() {
        let ring = OutputRing::new(10);
        ring.push_line("a".into());
        let snap = ring.snapshot();
        ring.push_line("b".into());
        assert_eq!(snap, vec!["a".to_string()]);
    }
}
