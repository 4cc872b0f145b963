// SPDX-License-Identifier: Apache-2.0

//! Bounded fingerprint cache that suppresses re-delivery of lines already seen.
//!
//! This is best-effort: once a fingerprint is evicted, or the process
//! restarts, a replayed line is delivered again. Callers that need a hard
//! exactly-once guarantee must dedup downstream on [`event_fingerprint`].
//!
//! [`event_fingerprint`]: crate::monitor::fingerprint::event_fingerprint

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// FIFO-evicting set of fingerprints.
///
/// Once the set grows past `capacity`, the oldest fifth is dropped in one go
/// so eviction cost is amortized across many inserts.
#[derive(Debug)]
pub struct DedupGuard {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
    evict_batch: usize,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl DedupGuard {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
            evict_batch: (capacity / 5).max(1),
        }
    }

    pub fn seen(&self, fingerprint: &str) -> bool {
        self.seen.contains(fingerprint)
    }

    pub fn record(&mut self, fingerprint: impl Into<String>) {
        let fingerprint = fingerprint.into();
        if !self.seen.insert(fingerprint.clone()) {
            return;
        }
        self.order.push_back(fingerprint);

        if self.order.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Records the fingerprint and returns true if it was new.
    pub fn check_and_record(&mut self, fingerprint: &str) -> bool {
        if self.seen(fingerprint) {
            return false;
        }
        self.record(fingerprint);
        true
    }

    fn evict_oldest(&mut self) {
        let n = self.evict_batch.min(self.order.len());
        for fp in self.order.drain(..n) {
            self.seen.remove(&fp);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}
