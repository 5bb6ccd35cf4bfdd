//! Fixed-capacity ring buffer of recent conversational turns. Never persisted.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortTermEntry {
    /// Speaker label, e.g. `用户` or `AI`.
    pub role: String,
    /// What was said.
    pub content: String,
    /// When it was said.
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer of the most recent turns; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct ShortTermBuffer {
    entries: VecDeque<ShortTermEntry>,
    capacity: usize,
}

impl ShortTermBuffer {
    /// Create an empty buffer. A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a turn, evicting the oldest when full.
    pub fn push(&mut self, entry: ShortTermEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Number of buffered turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of turns kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ShortTermEntry> {
        self.entries.iter()
    }

    /// Render as `role: content` lines, oldest first.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
