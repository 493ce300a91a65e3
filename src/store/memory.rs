//! In-process configuration store.
//!
//! Backs the test suite and the `--memory-store` demo mode. Supports
//! simulated latency and an outage switch so cache behaviour under a slow
//! or unreachable store can be exercised without a network.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::store::types::{ConfigDocument, FetchOutcome, LookupKey, Settings, StoreError};
use crate::store::ConfigStore;

pub struct MemoryStore {
    docs: DashMap<LookupKey, ConfigDocument>,
    next_revision: AtomicU64,
    reachable: AtomicBool,
    fetches: AtomicUsize,
    latency: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            next_revision: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Create or replace the document for `key`. Returns the new revision.
    pub fn upsert<K, V>(
        &self,
        key: LookupKey,
        settings: impl IntoIterator<Item = (K, V)>,
        agent_name: Option<&str>,
    ) -> String
    where
        K: Into<String>,
        V: Into<String>,
    {
        let settings: Settings = settings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let revision = format!("rev-{}", self.next_revision.fetch_add(1, Ordering::Relaxed));
        let mut doc = ConfigDocument::new(settings, revision.clone());
        if let Some(agent) = agent_name {
            doc = doc.with_agent_name(agent);
        }
        self.docs.insert(key, doc);
        revision
    }

    pub fn remove(&self, key: &LookupKey) -> bool {
        self.docs.remove(key).is_some()
    }

    /// Simulate the store going down or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of fetches served (including failed ones).
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn fetch(&self, key: &LookupKey) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return FetchOutcome::Unavailable(StoreError::Unreachable);
        }
        match self.docs.get(key) {
            Some(doc) => FetchOutcome::Found(doc.value().clone()),
            None => FetchOutcome::NotFound,
        }
    }
}
