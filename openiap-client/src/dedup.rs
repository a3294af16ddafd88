//! Rolling-window transaction-id deduplication.
//!
//! The store can notify the same transaction more than once (push feed plus
//! an explicit purchase result, or repeated delivery). An accepted id
//! suppresses further processing until its window elapses, after which a
//! later legitimate event with the same id (a renewal resend, say) can be
//! reprocessed.
//!
//! Not internally locked: the session monitor owns the only reference and
//! serializes access.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Set of recently accepted transaction ids.
#[derive(Debug)]
pub struct ProcessedIdSet {
    window: Duration,
    // id -> eviction deadline
    entries: HashMap<String, Instant>,
}

impl ProcessedIdSet {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Check whether an id is fresh, marking it processed if so.
    ///
    /// Returns `true` when the id was not being suppressed (caller should
    /// process the transaction). Returns `false` for a duplicate and pushes
    /// the id's eviction deadline out by a full window, the equivalent of
    /// re-scheduling its removal.
    pub fn check_and_mark(&mut self, id: &str, now: Instant) -> bool {
        self.cleanup_expired(now);
        let deadline = now + self.window;
        match self.entries.get_mut(id) {
            Some(existing) => {
                *existing = deadline;
                false
            }
            None => {
                self.entries.insert(id.to_owned(), deadline);
                true
            }
        }
    }

    /// Drop entries whose window has elapsed.
    pub fn cleanup_expired(&mut self, now: Instant) {
        self.entries.retain(|_, deadline| *deadline > now);
    }

    /// Whether an id is currently suppressed.
    pub fn contains(&self, id: &str, now: Instant) -> bool {
        self.entries.get(id).map_or(false, |deadline| *deadline > now)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
