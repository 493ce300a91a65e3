//! Lookup keys, configuration documents and store errors.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identifies one stored configuration document.
///
/// `environment: None` is the service-wide document. It is a distinct key,
/// not a wildcard: `(svc, None) != (svc, Some("production"))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub service_name: String,
    pub environment: Option<String>,
}

impl LookupKey {
    /// Key for a service in a specific environment.
    pub fn new(service_name: impl Into<String>, environment: Option<impl Into<String>>) -> Self {
        Self {
            service_name: service_name.into(),
            environment: environment.map(Into::into),
        }
    }

    /// Key for the service-wide (environment-less) document.
    pub fn service_default(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            environment: None,
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.environment {
            Some(env) => write!(f, "{}@{}", self.service_name, env),
            None => write!(f, "{}@*", self.service_name),
        }
    }
}

/// Settings as served to agents. Values are always strings.
pub type Settings = BTreeMap<String, String>;

/// A configuration document as fetched from the store. Never mutated;
/// a re-fetch produces a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub settings: Settings,
    /// Opaque version token; changes whenever `settings` change.
    pub revision: String,
    /// Agent the document was registered for. `None` applies to all agents.
    pub agent_name: Option<String>,
}

impl ConfigDocument {
    pub fn new(settings: Settings, revision: impl Into<String>) -> Self {
        Self {
            settings,
            revision: revision.into(),
            agent_name: None,
        }
    }

    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        let name = agent_name.into();
        self.agent_name = if name.is_empty() { None } else { Some(name) };
        self
    }
}

/// Why the store could not answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The call did not complete within its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, DNS failure and the like.
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with an unexpected status code.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The store answered but the body could not be understood.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The store is not reachable at all.
    #[error("store unreachable")]
    Unreachable,
}

/// Result of a single store fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(ConfigDocument),
    NotFound,
    Unavailable(StoreError),
}

impl FetchOutcome {
    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Found(_) => "found",
            FetchOutcome::NotFound => "not_found",
            FetchOutcome::Unavailable(_) => "unavailable",
        }
    }
}
