// ---------------------------------------------------------------------------
// RingBuffer -- fixed-capacity FIFO with O(1) eviction
// ---------------------------------------------------------------------------
//
// Backing storage is a single `Vec<T>` used as an arena.  Until the buffer is
// full, elements are appended; once full, `head` points at the oldest element
// and each push overwrites it and advances `head`.  Logical index `i`
// (0 = oldest) lives at physical slot `(head + i) % capacity`.

use crate::types::{Sample, SignalRecord};

/// Bounded, insertion-ordered buffer that evicts the oldest entry on overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    head: usize,
    capacity: usize,
}

/// Rolling price history of one instrument.
pub type HistoryBuffer = RingBuffer<Sample>;

/// Rolling history of derived signals.
pub type SignalHistory = RingBuffer<SignalRecord>;

impl<T> RingBuffer<T> {
    /// Create an empty buffer retaining at most `capacity` entries.
    ///
    /// A capacity of zero is bumped to one: a buffer that cannot hold the
    /// latest sample would leave every downstream computation without input.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Append `item`, evicting the oldest entry when the buffer is full.
    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Drop every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    /// Iterate all entries oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + Clone + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Iterate the most recent `min(n, len)` entries, oldest-first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> + Clone + '_ {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip)
    }
}

impl RingBuffer<Sample> {
    /// Most recent `min(n, len)` prices, oldest-first.
    ///
    /// The iterator borrows the buffer and is `Clone`, so a caller can walk it
    /// several times (e.g. once for the mean and once for the variance).
    pub fn window(&self, n: usize) -> impl Iterator<Item = f64> + Clone + '_ {
        self.recent(n).map(|s| s.price)
    }

    /// Prices of the `n` samples that precede the latest one, oldest-first.
    pub fn window_before_latest(&self, n: usize) -> impl Iterator<Item = f64> + Clone + '_ {
        let end = self.len().saturating_sub(1);
        let skip = end.saturating_sub(n);
        self.iter().take(end).skip(skip).map(|s| s.price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
