//! TTL cache in front of the configuration store.
//!
//! # Data Flow
//! ```text
//! get(key)
//!     → entry fresh?             yes → hit
//!     → flight.rs join_or_lead   follower → await leader's result
//!                                leader   → spawn fetch task
//!     → fetch task: re-check freshness, fetch_with_timeout, commit
//!     → on Unavailable: serve the previous entry as Stale, if any
//! ```
//!
//! # Invariants
//! - One store fetch per key at a time
//! - A commit never replaces an entry with a higher generation
//! - Entries are only replaced, never removed
//! - The fetch runs on its own task; callers that give up do not cancel it

pub mod entry;
pub(crate) mod flight;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{CacheConfig, KibanaConfig};
use crate::observability::metrics;
use crate::store::{fetch_with_timeout, ConfigStore, FetchOutcome, LookupKey, StoreError};

pub use entry::{CacheEntry, CacheRead, EntryState, Freshness};
use flight::{FlightGuard, FlightTable, Join};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The store could not be reached and no usable entry exists.
    #[error("configuration for {key} unavailable: {cause}")]
    Unavailable { key: LookupKey, cause: StoreError },
}

/// Timing policy of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a committed entry is served without asking the store.
    pub ttl: Duration,
    /// How long past `ttl` an entry may be served when a refresh fails.
    /// `None` serves stale entries for as long as the store is down.
    pub max_stale: Option<Duration>,
    /// Deadline for a single store fetch.
    pub fetch_timeout: Duration,
}

impl CachePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_stale: None,
            fetch_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = Some(max_stale);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn from_config(cache: &CacheConfig, kibana: &KibanaConfig) -> Self {
        Self {
            ttl: cache.expiration(),
            max_stale: cache.max_stale(),
            fetch_timeout: kibana.timeout(),
        }
    }

    fn is_servable_stale(&self, entry: &CacheEntry, now: Instant) -> bool {
        match self.max_stale {
            None => true,
            Some(grace) => entry.age(now) < self.ttl + grace,
        }
    }
}

/// Counters exposed through the admin API.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub stale_served: u64,
    pub store_fetches: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    stale_served: AtomicU64,
    store_fetches: AtomicU64,
}

struct CacheInner {
    store: Arc<dyn ConfigStore>,
    policy: CachePolicy,
    entries: DashMap<LookupKey, CacheEntry>,
    flights: FlightTable,
    generation: AtomicU64,
    counters: Counters,
}

/// Shared, cloneable handle on the cache.
#[derive(Clone)]
pub struct ConfigCache {
    inner: Arc<CacheInner>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn ConfigStore>, policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                policy,
                entries: DashMap::new(),
                flights: FlightTable::default(),
                generation: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    /// Resolve `key`, fetching from the store on miss or expiry.
    pub async fn get(&self, key: &LookupKey) -> Result<CacheRead, CacheError> {
        if let Some(entry) = self.inner.fresh_entry(key, Instant::now()) {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_lookup("hit");
            return Ok(CacheRead::fresh(entry));
        }
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup("miss");

        let flight = match self.inner.flights.join_or_lead(key, || self.inner.next_generation()) {
            Join::Leader(guard, flight) => {
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.run_fetch(guard).await });
                flight
            }
            Join::Follower(flight) => {
                self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, generation = flight.generation(), "Joining in-flight fetch");
                flight
            }
        };

        match flight.wait().await {
            Ok(entry) => Ok(CacheRead::fresh(entry)),
            Err(cause) => self.inner.fallback(key, cause),
        }
    }

    /// Current entry for `key` regardless of age. No store access.
    pub fn peek(&self, key: &LookupKey) -> Option<CacheEntry> {
        self.inner.entries.get(key).map(|e| e.value().clone())
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            entries: self.inner.entries.len(),
            in_flight: self.inner.flights.len(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            stale_served: c.stale_served.load(Ordering::Relaxed),
            store_fetches: c.store_fetches.load(Ordering::Relaxed),
        }
    }
}

impl CacheInner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fresh_entry(&self, key: &LookupKey, now: Instant) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .filter(|e| e.is_fresh(self.policy.ttl, now))
            .map(|e| e.value().clone())
    }

    async fn run_fetch(self: Arc<Self>, guard: FlightGuard) {
        let key = guard.key().clone();

        // Another flight may have committed between the caller's miss and
        // this flight being registered.
        if let Some(entry) = self.fresh_entry(&key, Instant::now()) {
            guard.complete(Ok(entry));
            return;
        }

        let started = Instant::now();
        self.counters.store_fetches.fetch_add(1, Ordering::Relaxed);
        let outcome = fetch_with_timeout(self.store.as_ref(), &key, self.policy.fetch_timeout).await;
        metrics::record_store_fetch(outcome.label(), started);

        let result = match outcome {
            FetchOutcome::Found(doc) => {
                Ok(self.commit(key, EntryState::Found(Arc::new(doc)), guard.generation()))
            }
            FetchOutcome::NotFound => Ok(self.commit(key, EntryState::NotFound, guard.generation())),
            FetchOutcome::Unavailable(cause) => Err(cause),
        };
        guard.complete(result);
    }

    /// Store the fetch result unless a newer generation is already present.
    /// Returns whichever entry is current afterwards.
    fn commit(&self, key: LookupKey, state: EntryState, generation: u64) -> CacheEntry {
        let entry = CacheEntry {
            key: key.clone(),
            state,
            fetched_at: Instant::now(),
            generation,
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().generation < generation {
                    occupied.insert(entry);
                } else {
                    tracing::debug!(
                        key = %occupied.key(),
                        current = occupied.get().generation,
                        discarded = generation,
                        "Discarding out-of-order fetch result"
                    );
                }
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => vacant.insert(entry).value().clone(),
        }
    }

    fn fallback(&self, key: &LookupKey, cause: StoreError) -> Result<CacheRead, CacheError> {
        let now = Instant::now();
        let current = self.entries.get(key).map(|e| e.value().clone());
        match current {
            Some(entry) if entry.is_fresh(self.policy.ttl, now) => Ok(CacheRead::fresh(entry)),
            Some(entry) if self.policy.is_servable_stale(&entry, now) => {
                self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup("stale");
                tracing::warn!(
                    key = %key,
                    error = %cause,
                    age_ms = entry.age(now).as_millis() as u64,
                    "Store unavailable, serving stale entry"
                );
                Ok(CacheRead::stale(entry))
            }
            _ => Err(CacheError::Unavailable { key: key.clone(), cause }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures_util::future::join_all;

    fn cache_with(store: Arc<MemoryStore>, ttl: Duration) -> ConfigCache {
        ConfigCache::new(store, CachePolicy::new(ttl))
    }

    fn revision(read: &CacheRead) -> Option<String> {
        read.entry.document().map(|d| d.revision.clone())
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_store() {
        let store = Arc::new(MemoryStore::new());
        let key = LookupKey::service_default("svc");
        let rev = store.upsert(key.clone(), [("transaction_sample_rate", "0.05")], None);
        let cache = cache_with(store.clone(), Duration::from_secs(60));

        let first = cache.get(&key).await.unwrap();
        let second = cache.get(&key).await.unwrap();

        assert_eq!(revision(&first), Some(rev.clone()));
        assert_eq!(revision(&second), Some(rev));
        assert_eq!(first.entry.generation, second.entry.generation);
        assert_eq!(store.fetch_count(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.store_fetches, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_expiry_refetches_and_bumps_generation() {
        let store = Arc::new(MemoryStore::new());
        let key = LookupKey::service_default("svc");
        store.upsert(key.clone(), [("transaction_sample_rate", "0.05")], None);
        let cache = cache_with(store.clone(), Duration::from_millis(50));

        let first = cache.get(&key).await.unwrap();
        let updated = store.upsert(key.clone(), [("transaction_sample_rate", "0.99")], None);

        // Still within TTL: old revision.
        assert_eq!(revision(&cache.get(&key).await.unwrap()), revision(&first));

        tokio::time::sleep(Duration::from_millis(80)).await;
        let refreshed = cache.get(&key).await.unwrap();

        assert_eq!(revision(&refreshed), Some(updated));
        assert!(refreshed.entry.generation > first.entry.generation);
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_cached() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone(), Duration::from_secs(60));
        let key = LookupKey::service_default("missing");

        for _ in 0..3 {
            let read = cache.get(&key).await.unwrap();
            assert_eq!(read.entry.state, EntryState::NotFound);
        }
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_single_fetch() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(100)));
        let key = LookupKey::service_default("svc");
        store.upsert(key.clone(), [("transaction_sample_rate", "0.05")], None);
        let cache = cache_with(store.clone(), Duration::from_secs(60));

        let lookups = (0..32).map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        });
        let results = join_all(lookups).await;

        let generations: Vec<u64> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().entry.generation)
            .collect();
        assert!(generations.iter().all(|g| *g == generations[0]));
        assert_eq!(store.fetch_count(), 1);
        let stats = cache.stats();
        assert_eq!(stats.coalesced + stats.hits, 31);
    }

    #[tokio::test]
    async fn test_concurrent_expired_lookups_single_fetch() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(50)));
        let key = LookupKey::service_default("svc");
        store.upsert(key.clone(), [("a", "1")], None);
        let cache = cache_with(store.clone(), Duration::from_millis(100));

        cache.get(&key).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let lookups = (0..16).map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        });
        for result in join_all(lookups).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_independently() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(100)));
        let cache = cache_with(store.clone(), Duration::from_secs(60));
        let default = LookupKey::service_default("svc");
        let prod = LookupKey::new("svc", Some("production"));

        let (a, b) = tokio::join!(cache.get(&default), cache.get(&prod));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(store.fetch_count(), 2);
        assert_eq!(cache.stats().coalesced, 0);
    }

    #[tokio::test]
    async fn test_serves_stale_when_store_down() {
        let store = Arc::new(MemoryStore::new());
        let key = LookupKey::service_default("svc");
        let rev = store.upsert(key.clone(), [("a", "1")], None);
        let cache = cache_with(store.clone(), Duration::from_millis(30));

        cache.get(&key).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.set_reachable(false);

        let read = cache.get(&key).await.unwrap();
        assert!(read.is_stale());
        assert_eq!(revision(&read), Some(rev));
        assert_eq!(cache.stats().stale_served, 1);
    }

    #[tokio::test]
    async fn test_unavailable_without_entry() {
        let store = Arc::new(MemoryStore::new());
        store.set_reachable(false);
        let cache = cache_with(store.clone(), Duration::from_secs(1));
        let key = LookupKey::service_default("svc");

        let err = cache.get(&key).await.unwrap_err();
        assert_eq!(
            err,
            CacheError::Unavailable { key: key.clone(), cause: StoreError::Unreachable }
        );
        assert!(cache.peek(&key).is_none());
    }

    #[tokio::test]
    async fn test_stale_grace_expires() {
        let store = Arc::new(MemoryStore::new());
        let key = LookupKey::service_default("svc");
        store.upsert(key.clone(), [("a", "1")], None);
        let policy = CachePolicy::new(Duration::from_millis(20)).with_max_stale(Duration::from_millis(30));
        let cache = ConfigCache::new(store.clone(), policy);

        cache.get(&key).await.unwrap();
        store.set_reachable(false);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&key).await.unwrap().is_stale());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(matches!(cache.get(&key).await, Err(CacheError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_fetch_timeout_without_entry() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(200)));
        let policy = CachePolicy::new(Duration::from_secs(1)).with_fetch_timeout(Duration::from_millis(20));
        let cache = ConfigCache::new(store, policy);

        let err = cache.get(&LookupKey::service_default("svc")).await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Unavailable { cause: StoreError::Timeout(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_cancel_fetch() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(50)));
        let key = LookupKey::service_default("svc");
        store.upsert(key.clone(), [("a", "1")], None);
        let cache = cache_with(store.clone(), Duration::from_secs(60));

        let caller = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.peek(&key).is_some());
        cache.get(&key).await.unwrap();
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_commit_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store, Duration::from_secs(60));
        let key = LookupKey::service_default("svc");

        let newer = cache.inner.commit(key.clone(), EntryState::NotFound, 5);
        assert_eq!(newer.generation, 5);

        let doc = crate::store::ConfigDocument::new(Default::default(), "old");
        let current = cache.inner.commit(key.clone(), EntryState::Found(Arc::new(doc)), 3);
        assert_eq!(current.generation, 5);
        assert_eq!(cache.peek(&key).unwrap().state, EntryState::NotFound);
    }
}
