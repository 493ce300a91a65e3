//! Environment fallback resolution.
//!
//! A request for `(service, env)` is answered by the first level of the
//! fallback chain whose cache entry is `Found`:
//!
//! ```text
//! 1. (service, Some(env))   only when env is non-empty
//! 2. (service, None)        service-wide default
//! ```
//!
//! Each level is an independent cache key with its own TTL. When every
//! level is `NotFound` the result is `Resolution::Empty`, not an error.

use std::sync::Arc;
use thiserror::Error;

use crate::cache::{CacheError, ConfigCache, EntryState};
use crate::store::{ConfigDocument, LookupKey, StoreError};

/// Revision reported for the "no configuration" result.
pub const EMPTY_REVISION: &str = "empty";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        document: Arc<ConfigDocument>,
        /// The level that produced the document.
        key: LookupKey,
        /// Served from a stale entry after a failed refresh.
        stale: bool,
    },
    Empty,
}

impl Resolution {
    pub fn revision(&self) -> &str {
        match self {
            Resolution::Found { document, .. } => &document.revision,
            Resolution::Empty => EMPTY_REVISION,
        }
    }

    pub fn document(&self) -> Option<&ConfigDocument> {
        match self {
            Resolution::Found { document, .. } => Some(document.as_ref()),
            Resolution::Empty => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Resolution::Found { stale: true, .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("backing store unavailable for {key}: {cause}")]
    Unavailable { key: LookupKey, cause: StoreError },
}

impl From<CacheError> for ResolveError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Unavailable { key, cause } => ResolveError::Unavailable { key, cause },
        }
    }
}

/// Ordered lookup keys for a request, most specific first.
pub fn fallback_chain(service_name: &str, environment: Option<&str>) -> Vec<LookupKey> {
    let mut chain = Vec::with_capacity(2);
    if let Some(env) = environment.filter(|e| !e.is_empty()) {
        chain.push(LookupKey::new(service_name, Some(env)));
    }
    chain.push(LookupKey::service_default(service_name));
    chain
}

/// Resolves requests against the cache.
#[derive(Clone)]
pub struct Resolver {
    cache: ConfigCache,
}

impl Resolver {
    pub fn new(cache: ConfigCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    /// Walk the fallback chain. An unavailable level aborts resolution:
    /// answering from a less specific level could hand out the wrong
    /// document.
    pub async fn resolve(
        &self,
        service_name: &str,
        environment: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        for key in fallback_chain(service_name, environment) {
            let read = self.cache.get(&key).await?;
            let stale = read.is_stale();
            match read.entry.state {
                EntryState::Found(document) => {
                    tracing::debug!(key = %key, revision = %document.revision, stale, "Resolved configuration");
                    return Ok(Resolution::Found { document, key, stale });
                }
                EntryState::NotFound => continue,
            }
        }
        tracing::debug!(service = service_name, environment = ?environment, "No configuration at any level");
        Ok(Resolution::Empty)
    }
}
