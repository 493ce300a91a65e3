//! Per-key single-flight coordination.
//!
//! At most one store fetch per key is in flight. The first caller becomes
//! the leader and receives a [`FlightGuard`]; later callers get a clone of
//! the [`Flight`] and wait on the same result. Keys never share a lock
//! beyond the `DashMap` shard lookup.
//!
//! The guard removes the table entry on drop, so a panicking or aborted
//! fetch task never leaves a key permanently "in flight". Waiters of such a
//! flight see [`StoreError::Transport`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::entry::CacheEntry;
use crate::store::{LookupKey, StoreError};

pub(crate) type FlightResult = Result<CacheEntry, StoreError>;

/// Handle on an in-flight fetch. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Flight {
    generation: u64,
    rx: watch::Receiver<Option<FlightResult>>,
}

impl Flight {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the leader to publish its result.
    pub(crate) async fn wait(mut self) -> FlightResult {
        match self.rx.wait_for(Option::is_some).await {
            Ok(result) => result
                .clone()
                .unwrap_or_else(|| Err(StoreError::Transport("fetch produced no result".into()))),
            Err(_) => Err(StoreError::Transport("fetch task ended without a result".into())),
        }
    }
}

/// Held by the leader for the duration of the fetch.
pub(crate) struct FlightGuard {
    table: Arc<DashMap<LookupKey, Flight>>,
    key: LookupKey,
    generation: u64,
    tx: watch::Sender<Option<FlightResult>>,
}

impl FlightGuard {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn key(&self) -> &LookupKey {
        &self.key
    }

    /// Publish the result to every waiter and release the key.
    pub(crate) fn complete(self, result: FlightResult) {
        self.tx.send_replace(Some(result));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        self.table
            .remove_if(&self.key, |_, flight| flight.generation == generation);
    }
}

pub(crate) enum Join {
    /// Caller must run the fetch and complete the guard.
    Leader(FlightGuard, Flight),
    /// A fetch is already running; wait on it.
    Follower(Flight),
}

#[derive(Clone, Default)]
pub(crate) struct FlightTable {
    flights: Arc<DashMap<LookupKey, Flight>>,
}

impl FlightTable {
    /// Join the running fetch for `key`, or become its leader. The generation
    /// is only allocated when a new flight is started.
    pub(crate) fn join_or_lead(&self, key: &LookupKey, next_generation: impl FnOnce() -> u64) -> Join {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(occupied) => Join::Follower(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let generation = next_generation();
                let (tx, rx) = watch::channel(None);
                let flight = Flight { generation, rx };
                vacant.insert(flight.clone());
                let guard = FlightGuard {
                    table: self.flights.clone(),
                    key: key.clone(),
                    generation,
                    tx,
                };
                Join::Leader(guard, flight)
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }
}
