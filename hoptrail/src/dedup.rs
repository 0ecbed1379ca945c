//! Duplicate suppression by packet id.
//!
//! The ledger is consulted once per dequeued packet before anything else happens
//! to it. Ids are remembered in arrival order and the oldest is forgotten once
//! the ledger is full, so memory stays bounded under flooding.

use alloc::collections::VecDeque;
use hashbrown::HashSet;

/// Bounded set of recently processed packet ids with FIFO eviction.
pub struct SeenLedger {
    ids: HashSet<u32>,
    order: VecDeque<u32>,
    capacity: usize,
}

impl SeenLedger {
    /// Create a ledger remembering at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn is_seen(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Remember `id`. Returns false if it was already present.
    pub fn mark_seen(&mut self, id: u32) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
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

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
