//! Kibana agent configuration client.
//!
//! # Responsibilities
//! - Search Kibana for the document registered for a lookup key
//! - Normalise setting values to strings
//! - Map every transport or protocol failure to `Unavailable`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::KibanaConfig;
use crate::store::types::{ConfigDocument, FetchOutcome, LookupKey, Settings, StoreError};
use crate::store::ConfigStore;

/// Relative to the base URL so a path prefix on the host is kept.
const SEARCH_PATH: &str = "api/apm/settings/agent-configuration/search";

/// Request body for the search endpoint.
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    service: ServiceQuery<'a>,
}

#[derive(Debug, Serialize)]
struct ServiceQuery<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'a str>,
}

/// A single search hit as returned by Kibana.
#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    #[serde(default)]
    settings: serde_json::Map<String, Value>,
    etag: Option<String>,
    agent_name: Option<String>,
}

/// HTTP client for Kibana's agent configuration API.
#[derive(Clone)]
pub struct KibanaStore {
    client: reqwest::Client,
    search_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl KibanaStore {
    /// Build a client for the configured Kibana host.
    pub fn new(config: &KibanaConfig) -> Result<Self, StoreError> {
        let base = config
            .base_url()
            .map_err(|e| StoreError::Transport(format!("invalid Kibana host '{}': {}", config.host, e)))?;
        let search_url = base
            .join(SEARCH_PATH)
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        tracing::info!(url = %search_url, timeout_ms = config.timeout_ms, "Kibana store initialized");

        Ok(Self {
            client,
            search_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn search(&self, key: &LookupKey) -> Result<FetchOutcome, StoreError> {
        let body = SearchRequest {
            service: ServiceQuery {
                name: &key.service_name,
                environment: key.environment.as_deref(),
            },
        };

        let mut request = self
            .client
            .post(self.search_url.clone())
            .header("kbn-xsrf", "true")
            .json(&body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let hit: SearchHit = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(FetchOutcome::Found(document_from_hit(hit)?))
            }
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            other => Err(StoreError::Status(other.as_u16())),
        }
    }
}

#[async_trait]
impl ConfigStore for KibanaStore {
    async fn fetch(&self, key: &LookupKey) -> FetchOutcome {
        match self.search(key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Kibana search failed");
                FetchOutcome::Unavailable(e)
            }
        }
    }
}

fn document_from_hit(hit: SearchHit) -> Result<ConfigDocument, StoreError> {
    let revision = hit
        .source
        .etag
        .or(hit.id)
        .ok_or_else(|| StoreError::Decode("search hit has neither etag nor _id".to_string()))?;

    let settings = settings_from_json(hit.source.settings);
    let mut doc = ConfigDocument::new(settings, revision);
    if let Some(agent) = hit.source.agent_name {
        doc = doc.with_agent_name(agent);
    }
    Ok(doc)
}

/// Agents expect string values; numbers and booleans keep their JSON text.
pub(crate) fn settings_from_json(raw: serde_json::Map<String, Value>) -> Settings {
    raw.into_iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_are_stringified() {
        let raw = json!({
            "transaction_sample_rate": 0.05,
            "capture_body": "all",
            "recording": true,
            "ignored": null,
        });
        let settings = settings_from_json(raw.as_object().unwrap().clone());

        assert_eq!(settings.len(), 3);
        assert_eq!(settings["transaction_sample_rate"], "0.05");
        assert_eq!(settings["capture_body"], "all");
        assert_eq!(settings["recording"], "true");
    }

    #[test]
    fn test_hit_revision_prefers_etag() {
        let hit: SearchHit = serde_json::from_value(json!({
            "_id": "abc",
            "_source": {
                "settings": {"transaction_sample_rate": 0.2},
                "etag": "e1",
                "agent_name": "rum-js"
            }
        }))
        .unwrap();
        let doc = document_from_hit(hit).unwrap();
        assert_eq!(doc.revision, "e1");
        assert_eq!(doc.agent_name.as_deref(), Some("rum-js"));
    }

    #[test]
    fn test_hit_falls_back_to_id() {
        let hit: SearchHit = serde_json::from_value(json!({
            "_id": "abc",
            "_source": {"settings": {}}
        }))
        .unwrap();
        assert_eq!(document_from_hit(hit).unwrap().revision, "abc");
    }

    #[test]
    fn test_hit_without_revision_is_invalid() {
        let hit: SearchHit = serde_json::from_value(json!({"_source": {}})).unwrap();
        assert!(matches!(document_from_hit(hit), Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_search_body_omits_absent_environment() {
        let body = SearchRequest {
            service: ServiceQuery { name: "svc", environment: None },
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"service": {"name": "svc"}}));
    }

    #[test]
    fn test_search_url_keeps_path_prefix() {
        let config = KibanaConfig {
            host: "http://kibana.internal/kibana".into(),
            ..KibanaConfig::default()
        };
        let store = KibanaStore::new(&config).unwrap();
        assert_eq!(
            store.search_url.as_str(),
            "http://kibana.internal/kibana/api/apm/settings/agent-configuration/search"
        );

        let bare = KibanaStore::new(&KibanaConfig { host: "kibana:5601".into(), ..KibanaConfig::default() }).unwrap();
        assert_eq!(bare.search_url.as_str(), "http://kibana:5601/api/apm/settings/agent-configuration/search");
    }

    #[test]
    fn test_invalid_host() {
        let config = KibanaConfig {
            host: "::not a url".into(),
            ..KibanaConfig::default()
        };
        assert!(KibanaStore::new(&config).is_err());
    }
}
