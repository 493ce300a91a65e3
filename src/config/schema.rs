//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Root configuration for the agent configuration server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Backing store connection (Kibana).
    pub kibana: KibanaConfig,

    /// Agent configuration endpoint toggles and credentials.
    pub agent_config: AgentConfigEndpoint,

    /// Cache tuning.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8200").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8200".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Connection to the Kibana agent configuration API.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct KibanaConfig {
    /// Kill switch for every agent configuration endpoint.
    pub enabled: bool,

    /// Base URL (e.g., "http://localhost:5601"). A bare host means `http://host`.
    pub host: String,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Optional basic auth credentials.
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for KibanaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "http://localhost:5601".to_string(),
            timeout_ms: 5_000,
            username: None,
            password: None,
        }
    }
}

impl KibanaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host` as a base URL with a trailing slash, so relative API paths
    /// keep any path prefix Kibana is mounted under.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let mut url = if self.host.contains("://") {
            Url::parse(&self.host)?
        } else {
            Url::parse(&format!("http://{}", self.host))?
        };
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Endpoint-level settings. These are hot-reloadable.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AgentConfigEndpoint {
    /// Shared secret agents must present as a Bearer token. No auth when unset.
    pub secret_token: Option<String>,

    /// Enables the browser-facing (RUM) route.
    pub rum_enabled: bool,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live of each cache entry in milliseconds.
    pub expiration_ms: u64,

    /// How long past expiry a stale entry may still be served while the
    /// store is unreachable. Unset means no limit.
    pub max_stale_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_ms: 30_000,
            max_stale_ms: None,
        }
    }
}

impl CacheConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }

    pub fn max_stale(&self) -> Option<Duration> {
        self.max_stale_ms.map(Duration::from_millis)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub log_json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8201".to_string(),
        }
    }
}
