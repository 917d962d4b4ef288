//! Rolling window of recent blockhashes used for redundant transaction copies

use solana_sdk::hash::Hash;
use std::collections::VecDeque;

/// Bounded FIFO of recently observed blockhashes, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockhashWindow {
    capacity: usize,
    hashes: VecDeque<Hash>,
}

impl BlockhashWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            hashes: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a blockhash, evicting the oldest once full.
    /// A hash equal to the newest entry is ignored.
    pub fn push(&mut self, hash: Hash) -> Option<Hash> {
        if self.hashes.back() == Some(&hash) {
            return None;
        }
        let evicted = if self.hashes.len() == self.capacity {
            self.hashes.pop_front()
        } else {
            None
        };
        self.hashes.push_back(hash);
        evicted
    }

    pub fn snapshot(&self) -> Vec<Hash> {
        self.hashes.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Hash> {
        self.hashes.back().copied()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
