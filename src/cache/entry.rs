//! Cache entries and read results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::{ConfigDocument, LookupKey};

/// What the store said about a key the last time it was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Found(Arc<ConfigDocument>),
    /// Negative entry: the store has no document for this key.
    NotFound,
}

/// A committed fetch result for one key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: LookupKey,
    pub state: EntryState,
    pub fetched_at: Instant,
    /// Allocated when the fetch started; strictly increasing per cache.
    pub generation: u64,
}

impl CacheEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) < ttl
    }

    pub fn document(&self) -> Option<&Arc<ConfigDocument>> {
        match &self.state {
            EntryState::Found(doc) => Some(doc),
            EntryState::NotFound => None,
        }
    }
}

/// Whether a read was served within its TTL or as a fallback after a
/// failed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// An entry returned by the cache together with its freshness.
#[derive(Debug, Clone)]
pub struct CacheRead {
    pub entry: CacheEntry,
    pub freshness: Freshness,
}

impl CacheRead {
    pub fn fresh(entry: CacheEntry) -> Self {
        Self { entry, freshness: Freshness::Fresh }
    }

    pub fn stale(entry: CacheEntry) -> Self {
        Self { entry, freshness: Freshness::Stale }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}
