//! Agent configuration endpoints.
//!
//! Request processing is a fixed sequence; the first failing step decides
//! the outcome:
//!
//! ```text
//! route enabled? ─no─▶ 403 forbidden
//!   │
//! token valid?   ─no─▶ 401 invalid token
//!   │
//! service.name?  ─no─▶ 400 invalid query
//!   │
//! resolve        ─unavailable─▶ 503
//!   │
//! If-None-Match == ETag? ─yes─▶ 304
//!   │
//! 200 filtered settings
//! ```

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Method, Request},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use crate::agents::{filter_for_agent_kind, AgentKind};
use crate::config::ServerConfig;
use crate::http::auth::{bearer_token, SecretToken, TokenVerifier};
use crate::http::outcome::Outcome;
use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::observability::metrics;

pub const BACKEND_PATH: &str = "/config/v1/agents";
pub const RUM_PATH: &str = "/config/v1/rum/agents";

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Hot-reloadable endpoint switches.
#[derive(Clone, Default)]
pub struct EndpointSettings {
    /// Kill switch for both routes.
    pub enabled: bool,
    pub rum_enabled: bool,
    /// `None` disables authentication.
    pub verifier: Option<Arc<dyn TokenVerifier>>,
}

impl EndpointSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            enabled: config.kibana.enabled,
            rum_enabled: config.agent_config.rum_enabled,
            verifier: config
                .agent_config
                .secret_token
                .as_ref()
                .map(|t| Arc::new(SecretToken::new(t.clone())) as Arc<dyn TokenVerifier>),
        }
    }

    pub fn is_enabled(&self, kind: AgentKind) -> bool {
        match kind {
            AgentKind::Backend => self.enabled,
            AgentKind::Rum => self.enabled && self.rum_enabled,
        }
    }

    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        match &self.verifier {
            Some(verifier) => verifier.verify(bearer_token(headers)),
            None => true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueryParams {
    #[serde(rename = "service.name")]
    service_name: Option<String>,
    #[serde(rename = "service.environment")]
    service_environment: Option<String>,
    /// RUM agents cannot always set headers and send the ETag here.
    ifnonematch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BodyParams {
    #[serde(default)]
    service: ServiceParams,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceParams {
    name: Option<String>,
    environment: Option<String>,
}

/// Parameters of one request, merged from query string, body and headers.
#[derive(Debug, Default, PartialEq, Eq)]
struct RequestParams {
    service_name: Option<String>,
    environment: Option<String>,
    if_none_match: Option<String>,
}

impl RequestParams {
    async fn extract(request: Request<Body>) -> Result<Self, Outcome> {
        let (parts, body) = request.into_parts();
        let query = Query::<QueryParams>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .map_err(|e| Outcome::InvalidQuery(e.body_text()))?;

        let body_params = if parts.method == Method::POST {
            let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|e| Outcome::InvalidQuery(format!("unable to read body: {}", e)))?;
            if bytes.is_empty() {
                BodyParams::default()
            } else {
                serde_json::from_slice(&bytes)
                    .map_err(|e| Outcome::InvalidQuery(format!("invalid JSON body: {}", e)))?
            }
        } else {
            BodyParams::default()
        };

        let header_etag = parts
            .headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            service_name: query.service_name.or(body_params.service.name),
            environment: query.service_environment.or(body_params.service.environment),
            if_none_match: header_etag.or(query.ifnonematch),
        })
    }
}

/// Opaque tag for a revision. Revisions outside the `etagc` characters, or
/// containing the list separator, are hex encoded so the tag always fits in
/// a header and in an `If-None-Match` list.
fn etag_value(revision: &str) -> Cow<'_, str> {
    if revision
        .bytes()
        .all(|b| b != b',' && (b == 0x21 || (0x23..=0x7e).contains(&b)))
    {
        Cow::Borrowed(revision)
    } else {
        Cow::Owned(revision.bytes().map(|b| format!("{:02x}", b)).collect())
    }
}

/// Quoted entity tag for a revision.
pub fn etag_for(revision: &str) -> String {
    format!("\"{}\"", etag_value(revision))
}

/// Whether an `If-None-Match` value names `revision`. Accepts quoted and
/// unquoted tags, weak tags, lists and `*`.
pub fn etag_matches(if_none_match: &str, revision: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|tag| {
        if tag == "*" {
            return true;
        }
        let tag = tag.strip_prefix("W/").unwrap_or(tag);
        tag.trim_matches('"') == etag_value(revision)
    })
}

async fn decide(state: &AppState, kind: AgentKind, request: Request<Body>) -> Outcome {
    let settings = state.endpoint.load_full();

    if !settings.is_enabled(kind) {
        return Outcome::Forbidden;
    }
    if !settings.is_authorized(request.headers()) {
        return Outcome::InvalidToken;
    }

    let params = match RequestParams::extract(request).await {
        Ok(params) => params,
        Err(outcome) => return outcome,
    };
    let service_name = match params.service_name.filter(|s| !s.is_empty()) {
        Some(name) => name,
        None => return Outcome::missing_service_name(),
    };

    let resolution = match state
        .resolver
        .resolve(&service_name, params.environment.as_deref())
        .await
    {
        Ok(resolution) => resolution,
        Err(e) => return Outcome::Unavailable(e),
    };

    let max_age = state.resolver.cache().policy().ttl;
    let etag = etag_for(resolution.revision());
    if let Some(candidate) = params.if_none_match.as_deref() {
        if etag_matches(candidate, resolution.revision()) {
            return Outcome::NotModified { etag, max_age };
        }
    }

    let settings = resolution
        .document()
        .map(|doc| filter_for_agent_kind(doc, kind))
        .unwrap_or_default();
    Outcome::Resolved { etag, settings, max_age }
}

async fn serve(state: AppState, kind: AgentKind, request: Request<Body>) -> Response {
    let start = Instant::now();
    let url = request.uri().path().to_string();
    let request_id = request_id(request.headers());

    let outcome = decide(&state, kind, request).await;

    state.decisions.record(outcome.decision_record(url, request_id));
    metrics::record_request(kind.as_str(), outcome.status().as_u16(), start);
    outcome.into_response()
}

/// `GET|POST /config/v1/agents`
pub async fn backend_agent_config(State(state): State<AppState>, request: Request<Body>) -> Response {
    serve(state, AgentKind::Backend, request).await
}

/// `GET|POST /config/v1/rum/agents`
pub async fn rum_agent_config(State(state): State<AppState>, request: Request<Body>) -> Response {
    serve(state, AgentKind::Rum, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_etag_matching() {
        assert!(etag_matches("\"rev-1\"", "rev-1"));
        assert!(etag_matches("rev-1", "rev-1"));
        assert!(etag_matches("W/\"rev-1\"", "rev-1"));
        assert!(etag_matches("\"rev-0\", \"rev-1\"", "rev-1"));
        assert!(etag_matches("*", "rev-1"));
        assert!(!etag_matches("\"rev-2\"", "rev-1"));
        assert!(!etag_matches("", "rev-1"));
    }

    #[test]
    fn test_revision_outside_header_charset_is_encoded() {
        let revision = "rev 1, \"ü\"";
        let etag = etag_for(revision);

        assert!(HeaderValue::from_str(&etag).is_ok());
        assert!(etag.trim_matches('"').bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(etag_matches(&etag, revision));
        assert!(!etag_matches(&etag, "rev 2"));
    }

    #[test]
    fn test_etag_for_is_quoted() {
        assert_eq!(etag_for("abc"), "\"abc\"");
        assert!(etag_matches(&etag_for("abc"), "abc"));
    }

    #[test]
    fn test_rum_requires_both_switches() {
        let mut settings = EndpointSettings { enabled: true, rum_enabled: false, verifier: None };
        assert!(settings.is_enabled(AgentKind::Backend));
        assert!(!settings.is_enabled(AgentKind::Rum));

        settings.rum_enabled = true;
        assert!(settings.is_enabled(AgentKind::Rum));

        settings.enabled = false;
        assert!(!settings.is_enabled(AgentKind::Backend));
        assert!(!settings.is_enabled(AgentKind::Rum));
    }

    #[test]
    fn test_authorization() {
        let mut config = ServerConfig::default();
        assert!(EndpointSettings::from_config(&config).is_authorized(&HeaderMap::new()));

        config.agent_config.secret_token = Some("supersecret".into());
        let settings = EndpointSettings::from_config(&config);
        assert!(!settings.is_authorized(&HeaderMap::new()));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer supersecret"));
        assert!(settings.is_authorized(&headers));
    }

    #[tokio::test]
    async fn test_params_from_query_and_header() {
        let request = Request::get("/config/v1/agents?service.name=svc&service.environment=prod&ifnonematch=rev-1")
            .header(header::IF_NONE_MATCH, "\"rev-2\"")
            .body(Body::empty())
            .unwrap();

        let params = RequestParams::extract(request).await.unwrap();
        assert_eq!(params.service_name.as_deref(), Some("svc"));
        assert_eq!(params.environment.as_deref(), Some("prod"));
        assert_eq!(params.if_none_match.as_deref(), Some("\"rev-2\""));
    }

    #[tokio::test]
    async fn test_params_from_post_body() {
        let request = Request::post("/config/v1/agents")
            .body(Body::from(r#"{"service": {"name": "svc", "environment": "prod"}}"#))
            .unwrap();

        let params = RequestParams::extract(request).await.unwrap();
        assert_eq!(params.service_name.as_deref(), Some("svc"));
        assert_eq!(params.environment.as_deref(), Some("prod"));
        assert!(params.if_none_match.is_none());
    }

    #[tokio::test]
    async fn test_invalid_post_body() {
        let request = Request::post("/config/v1/agents").body(Body::from("{not json")).unwrap();
        let outcome = RequestParams::extract(request).await.unwrap_err();
        assert_eq!(outcome.status().as_u16(), 400);
    }
}
