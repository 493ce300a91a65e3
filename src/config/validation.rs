//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and cross-field
//! requirements. All problems are reported, not just the first.

use std::fmt;

use crate::config::schema::ServerConfig;

/// Maximum number of store fetches behind one request.
const FALLBACK_LEVELS: u64 = 2;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.kibana.enabled {
        match config.kibana.base_url() {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                "kibana.host",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("kibana.host", e.to_string())),
        }
    }

    if config.kibana.timeout_ms == 0 {
        errors.push(ValidationError::new("kibana.timeout_ms", "must be greater than 0"));
    }

    if config.cache.expiration_ms == 0 {
        errors.push(ValidationError::new("cache.expiration_ms", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    // A request may wait on one store fetch per fallback level; the request
    // timeout must leave room for all of them so every request is recorded.
    let request_ms = config.timeouts.request_secs.saturating_mul(1_000);
    if config.kibana.timeout_ms > 0
        && request_ms > 0
        && config.kibana.timeout_ms.saturating_mul(FALLBACK_LEVELS) >= request_ms
    {
        errors.push(ValidationError::new(
            "kibana.timeout_ms",
            format!(
                "{} fetches of {}ms must fit within timeouts.request_secs ({}s)",
                FALLBACK_LEVELS, config.kibana.timeout_ms, config.timeouts.request_secs
            ),
        ));
    }

    if matches!(config.agent_config.secret_token.as_deref(), Some("")) {
        errors.push(ValidationError::new(
            "agent_config.secret_token",
            "must not be empty; omit it to disable auth",
        ));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
