//! Bounded de-duplication set.
//!
//! Every cid inserted into the window is recorded here. Removing rows only
//! removes the cid from the set; the FIFO queue is cleaned lazily, so the
//! queue may hold stale entries that are skipped on eviction.

use crate::model::{Cid, WindowError};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Cids currently considered "already shown", with FIFO eviction.
#[derive(Debug, Clone)]
pub struct StoredCids {
    set: HashSet<Cid>,
    queue: VecDeque<Cid>,
    limit: usize,
}

impl StoredCids {
    /// Empty set bounded by `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            set: HashSet::new(),
            queue: VecDeque::new(),
            limit,
        }
    }

    /// Configured bound.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// True when `cid` is stored.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.set.contains(cid)
    }

    /// Records `cid`.
    pub fn store(&mut self, cid: Cid) {
        if self.set.insert(cid.clone()) {
            self.queue.push_back(cid);
        }
    }

    /// Forgets `cid`; its queue entry goes stale.
    pub fn remove(&mut self, cid: &Cid) {
        self.set.remove(cid);
    }

    /// Number of stored cids.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Length of the eviction queue, stale entries included.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.set.clear();
        self.queue.clear();
    }

    /// Evicts the oldest cids until the set is within its bound.
    ///
    /// Also compacts the queue once stale entries outnumber live ones.
    ///
    /// # Errors
    ///
    /// Returns `WindowError::StoredCidQueueDrained` if the queue runs dry
    /// while the set still holds cids. The set is cleared in that case so
    /// the bound holds again.
    pub fn cleanup(&mut self) -> Result<(), WindowError> {
        let before = self.set.len();

        while self.set.len() > self.limit {
            let Some(cid) = self.queue.pop_front() else {
                break;
            };
            self.set.remove(&cid);
        }

        if self.queue.is_empty() && !self.set.is_empty() {
            let orphaned = self.set.len();
            debug_assert!(false, "stored cid queue drained with {orphaned} cids left");
            warn!(orphaned, "Stored cid queue drained, clearing set");
            self.set.clear();
            return Err(WindowError::StoredCidQueueDrained { orphaned });
        }

        if self.queue.len() > 2 * self.limit.max(self.set.len()) {
            self.compact();
        }

        if before != self.set.len() {
            debug!(
                evicted = before - self.set.len(),
                remaining = self.set.len(),
                "Evicted stored cids"
            );
        }
        Ok(())
    }

    /// Removes stale queue entries, keeping each live cid once at its
    /// oldest position.
    fn compact(&mut self) {
        let mut seen = HashSet::with_capacity(self.set.len());
        let set = &self.set;
        self.queue
            .retain(|cid| set.contains(cid) && seen.insert(cid.clone()));
    }
}
