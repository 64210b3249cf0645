//! Bounded, ordered record of what happened in the session.
//!
//! Entries are appended at the back and evicted from the front once the
//! capacity is exceeded. Eviction shifts every index down, so anything
//! holding an index (the navigator) must be told how many entries went.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::ops::Range;

/// Whether an entry was typed by the user or produced by a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Input,
    Output,
}

impl EntryKind {
    /// Short badge shown in the reading overlay.
    pub fn badge(self) -> &'static str {
        match self {
            EntryKind::Input => "IN",
            EntryKind::Output => "OUT",
        }
    }
}

/// One completed line of input or output.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferEntry {
    pub kind: EntryKind,
    pub content: String,
    pub captured_at: DateTime<Local>,
}

impl BufferEntry {
    pub fn is_input(&self) -> bool {
        self.kind == EntryKind::Input
    }
}

/// Append-only ring of [`BufferEntry`] with a fixed capacity.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<BufferEntry>,
    capacity: usize,
    /// Entries ever appended, including evicted ones.
    total_appended: u64,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_appended: 0,
        }
    }

    /// Append an entry stamped with the current local time.
    ///
    /// Returns how many entries were evicted from the front to stay within
    /// capacity (0 or 1 in practice).
    pub fn append(&mut self, kind: EntryKind, content: impl Into<String>) -> usize {
        self.append_at(kind, content, Local::now())
    }

    pub fn append_at(
        &mut self,
        kind: EntryKind,
        content: impl Into<String>,
        captured_at: DateTime<Local>,
    ) -> usize {
        self.entries.push_back(BufferEntry {
            kind,
            content: content.into(),
            captured_at,
        });
        self.total_appended += 1;

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if self.evict_oldest().is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::trace!(evicted, capacity = self.capacity, "History full, evicted oldest");
        }
        evicted
    }

    /// Remove and return the oldest entry.
    pub fn evict_oldest(&mut self) -> Option<BufferEntry> {
        self.entries.pop_front()
    }

    pub fn get(&self, index: usize) -> Option<&BufferEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BufferEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Entries in `range` (clamped to the current length) with their indices.
    pub fn window(&self, range: Range<usize>) -> impl Iterator<Item = (usize, &BufferEntry)> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        self.entries.range(start..end).enumerate().map(move |(i, e)| (start + i, e))
    }

    /// Index of the most recent entry of `kind`.
    pub fn last_index_of(&self, kind: EntryKind) -> Option<usize> {
        self.entries.iter().rposition(|entry| entry.kind == kind)
    }

    /// Entries after the most recent Input entry: the output of the last
    /// command. Everything when no command was recorded.
    pub fn entries_since_last_input(&self) -> impl Iterator<Item = &BufferEntry> {
        let start = self
            .last_index_of(EntryKind::Input)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.entries.range(start..)
    }

    /// 1-based display number of the entry at `index`, stable across
    /// evictions.
    pub fn sequence_number(&self, index: usize) -> u64 {
        let evicted = self.total_appended - self.entries.len() as u64;
        evicted + index as u64 + 1
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }
}
