use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::StarGift;

/// State carried by the poll loop between iterations.
///
/// Lives for the whole process and is never persisted: a restart begins
/// with no known gifts and a zero change-token.
pub struct WatchState {
    /// Gift ids seen at least once. Only grows.
    known: HashSet<i64>,
    /// Change-token from the last processed catalog.
    hash: i32,
    summary_printed: bool,
    /// Bumped once per poll; sampled by the watchdog.
    activity: Arc<AtomicU64>,
}

impl Default for WatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchState {
    pub fn new() -> Self {
        Self {
            known: HashSet::new(),
            hash: 0,
            summary_printed: false,
            activity: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle on the activity counter, for the watchdog.
    pub fn activity(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.activity)
    }

    /// Count one poll iteration. Returns the new count.
    pub fn tick(&self) -> u64 {
        self.activity.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn activity_count(&self) -> u64 {
        self.activity.load(Ordering::Relaxed)
    }

    pub fn hash(&self) -> i32 {
        self.hash
    }

    /// Store the change-token of a processed catalog.
    pub fn advance(&mut self, hash: i32) {
        self.hash = hash;
    }

    pub fn is_known(&self, id: i64) -> bool {
        self.known.contains(&id)
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Add every gift id to the known set and return the ids that were not
    /// in it before, in catalog order.
    pub fn record_gifts(&mut self, gifts: &[StarGift]) -> Vec<i64> {
        gifts
            .iter()
            .filter(|g| self.known.insert(g.id))
            .map(|g| g.id)
            .collect()
    }

    pub fn summary_printed(&self) -> bool {
        self.summary_printed
    }

    /// True exactly once: the first time a full catalog is seen.
    pub fn claim_summary(&mut self) -> bool {
        !std::mem::replace(&mut self.summary_printed, true)
    }
}
