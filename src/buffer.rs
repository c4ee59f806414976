// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bounded Sequence Buffer
//!
//! A fixed-capacity circular container holding the most recent samples of a
//! single signal. The live stream runs indefinitely, so ingestion must be O(1)
//! and memory must stay bounded: pushing into a full buffer silently evicts
//! the oldest element.
//!
//! ```text
//! capacity = 5, after pushing 1..=7
//!
//! storage:  [ 6 | 7 | 3 | 4 | 5 ]
//!                     ^ head (oldest)
//! values(): [3, 4, 5, 6, 7]
//! ```
//!
//! # Example
//!
//! ```rust
//! use gesha_telemetry::buffer::RingBuffer;
//!
//! let mut buffer = RingBuffer::new(3);
//! buffer.push(1).push(2).push(3).push(4);
//!
//! assert_eq!(buffer.values(), vec![2, 3, 4]);
//! assert_eq!(buffer.first(), Some(&2));
//! assert_eq!(buffer.last(), Some(&4));
//! ```

use std::fmt;

/// Fixed-capacity FIFO buffer with O(1) push and O(1) access to both ends
#[derive(Clone)]
pub struct RingBuffer<T> {
    storage: Vec<T>,
    /// Physical index of the oldest element. Always 0 until the buffer fills.
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` elements
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append one element, overwriting the oldest when full
    pub fn push(&mut self, value: T) -> &mut Self {
        if self.capacity == 0 {
            return self;
        }

        if self.storage.len() < self.capacity {
            self.storage.push(value);
        } else {
            self.storage[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }

        self
    }

    /// Replace the contents with `values`
    ///
    /// Only the trailing `capacity` elements are kept. Indices are reset so
    /// the next [`push`](Self::push) continues from the loaded tail.
    pub fn load<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut values: Vec<T> = values.into_iter().collect();

        if values.len() > self.capacity {
            values.drain(..values.len() - self.capacity);
        }

        self.storage = values;
        self.storage.reserve(self.capacity - self.storage.len());
        self.head = 0;

        self
    }

    /// Oldest element held
    pub fn first(&self) -> Option<&T> {
        self.storage.get(self.head)
    }

    /// Most recently pushed element
    pub fn last(&self) -> Option<&T> {
        if self.storage.is_empty() {
            return None;
        }

        let len = self.storage.len();
        self.storage.get((self.head + len - 1) % len)
    }

    /// Number of elements currently held
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Maximum number of elements the buffer holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.storage.len() == self.capacity
    }

    /// Drop every element, keeping the capacity
    pub fn clear(&mut self) {
        self.storage.clear();
        self.head = 0;
    }

    /// Iterate oldest to newest without allocating
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (newer, older) = self.storage.split_at(self.head);
        older.iter().chain(newer.iter())
    }
}

impl<T: Clone> RingBuffer<T> {
    /// All held elements, oldest to newest
    pub fn values(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("values", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reports_its_length() {
        let mut buffer = RingBuffer::<String>::new(100);
        assert_eq!(buffer.len(), 0);

        buffer.push("abc".to_string());
        assert_eq!(buffer.len(), 1);

        for i in 0..10 {
            buffer.push(format!("i{i}"));
        }
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn test_never_grows_past_capacity() {
        let mut buffer = RingBuffer::new(10);
        for i in 0..50 {
            buffer.push(i);
        }

        assert_eq!(buffer.len(), 10);
        assert!(buffer.is_full());
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = RingBuffer::<i32>::new(10);

        assert!(buffer.values().is_empty());
        assert_eq!(buffer.first(), None);
        assert_eq!(buffer.last(), None);
    }

    #[test]
    fn test_values_when_partially_filled() {
        let mut buffer = RingBuffer::new(5);
        buffer.push(1).push(2).push(3);

        assert_eq!(buffer.values(), vec![1, 2, 3]);
    }

    #[test]
    fn test_values_when_exactly_full() {
        let mut buffer = RingBuffer::new(5);
        buffer.push(1).push(2).push(3).push(4).push(5);

        assert_eq!(buffer.values(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_values_after_overflow() {
        let mut buffer = RingBuffer::new(5);
        buffer.push(1).push(2).push(3).push(4).push(5).push(6);

        assert_eq!(buffer.values(), vec![2, 3, 4, 5, 6]);
        assert_eq!(buffer.first(), Some(&2));
    }

    #[test]
    fn test_last_tracks_every_push() {
        let mut buffer = RingBuffer::new(50);
        for i in 0..100 {
            buffer.push(i);
            assert_eq!(buffer.last(), Some(&i));
        }

        assert_eq!(buffer.values(), (50..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_load_keeps_trailing_values_and_continues() {
        let mut buffer = RingBuffer::new(5);
        buffer.load(vec![1, 2, 3, 4, 5, 6, 7, 8]);

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.values(), vec![4, 5, 6, 7, 8]);

        buffer.push(500);
        assert_eq!(buffer.values(), vec![5, 6, 7, 8, 500]);
        assert_eq!(buffer.last(), Some(&500));
    }

    #[test]
    fn test_load_shorter_than_capacity_after_wraparound() {
        let mut buffer = RingBuffer::new(4);
        buffer.extend(0..11);
        buffer.load(vec![20, 21]);

        assert_eq!(buffer.values(), vec![20, 21]);

        buffer.push(22).push(23).push(24);
        assert_eq!(buffer.values(), vec![21, 22, 23, 24]);
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1).load(vec![1, 2]);

        assert!(buffer.is_empty());
        assert_eq!(buffer.last(), None);
    }

    #[test]
    fn test_iter_is_reversible() {
        let mut buffer = RingBuffer::new(3);
        buffer.extend([1, 2, 3, 4]);

        let newest_first: Vec<_> = buffer.iter().rev().copied().collect();
        assert_eq!(newest_first, vec![4, 3, 2]);
    }
}
