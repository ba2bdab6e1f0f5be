//! Bounded message log and chat history.

use std::collections::VecDeque;

use crate::Message;

// ---------------------------------------------------------------------------
// MessageLog
// ---------------------------------------------------------------------------

/// Decoded log lines, oldest first. Pushing past capacity evicts the
/// oldest line.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<Message>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends a line. A zero-capacity log stays empty.
    pub fn push(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every line.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// ChatHistory
// ---------------------------------------------------------------------------

/// Lines the user submitted, for up-arrow style recall.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    lines: VecDeque<String>,
    capacity: usize,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Recalls a line counting back from the newest.
    ///
    /// `None` and `Some(0)` both return the newest line. Offsets past the
    /// oldest line are clamped to it. The returned index is the offset
    /// actually used, so a caller can step from it. Returns `None` only
    /// when the history is empty.
    pub fn recall(&self, offset: Option<usize>) -> Option<(String, usize)> {
        let newest = self.lines.len().checked_sub(1)?;
        let offset = offset.unwrap_or(0).min(newest);
        let line = self.lines.get(newest - offset)?;
        Some((line.clone(), offset))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
