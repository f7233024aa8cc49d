//! Fixed-capacity history buffer

use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Ring buffer keeping the most recent `capacity` entries
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> BoundedHistory<T> {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
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

    /// Entries dropped to stay within capacity
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Entries ever pushed
    pub fn total(&self) -> u64 {
        self.evicted + self.entries.len() as u64
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().rev()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<T: Serialize> Serialize for BoundedHistory<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut history = BoundedHistory::new(3);
        for i in 0..5 {
            history.push(i);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(history.newest_first().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert_eq!(history.evicted(), 2);
        assert_eq!(history.total(), 5);
        assert_eq!(history.latest(), Some(&4));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut history = BoundedHistory::new(0);
        history.push("a");
        history.push("b");
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.latest(), Some(&"b"));
    }
}
