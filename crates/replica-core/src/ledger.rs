//! Bounded record of evaluated assignment and deep-hash messages.

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// `(epoch, nonce)` of a message that has already been evaluated.
pub type EvaluationKey = (Option<u64>, u64);

/// FIFO set of evaluated keys; the oldest key is evicted at capacity.
///
/// Lives in memory only. A restart starts empty, and a full refresh clears
/// it because the adopted state supersedes everything recorded so far.
#[derive(Debug)]
pub struct EvaluationLedger {
    capacity: usize,
    order: VecDeque<EvaluationKey>,
    seen: HashSet<EvaluationKey>,
}

impl Default for EvaluationLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl EvaluationLedger {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn contains(&self, key: &EvaluationKey) -> bool {
        self.seen.contains(key)
    }

    /// Returns `false` if the key was already present.
    pub fn record(&mut self, key: EvaluationKey) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
