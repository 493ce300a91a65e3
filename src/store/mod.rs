//! Backing store subsystem.
//!
//! # Data Flow
//! ```text
//! cache miss for LookupKey
//!     → fetch_with_timeout (deadline enforced here, for every store)
//!     → ConfigStore::fetch
//!         kibana.rs  (POST agent-configuration/search)
//!         memory.rs  (in-process map, tests and demo mode)
//!     → FetchOutcome::{Found, NotFound, Unavailable}
//! ```
//!
//! # Design Decisions
//! - No retries here; the cache owns retry and single-flight policy
//! - Transport failures never surface as errors, only as `Unavailable`

pub mod kibana;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use std::time::Duration;

pub use kibana::KibanaStore;
pub use memory::MemoryStore;
pub use types::{ConfigDocument, FetchOutcome, LookupKey, Settings, StoreError};

/// The authoritative source of agent configuration documents.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the document registered for exactly this key.
    async fn fetch(&self, key: &LookupKey) -> FetchOutcome;
}

/// Run a fetch under a deadline. A timeout maps to `Unavailable`.
pub async fn fetch_with_timeout(
    store: &dyn ConfigStore,
    key: &LookupKey,
    deadline: Duration,
) -> FetchOutcome {
    match tokio::time::timeout(deadline, store.fetch(key)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(key = %key, timeout = ?deadline, "Store fetch timed out");
            FetchOutcome::Unavailable(StoreError::Timeout(deadline))
        }
    }
}
