//! Request outcomes of the agent configuration endpoints.
//!
//! Each outcome maps to one status code, one decision record and one
//! response. The message and error strings are matched by log consumers
//! and must not change.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

use crate::observability::{DecisionLevel, DecisionRecord};
use crate::resolve::ResolveError;
use crate::store::Settings;

pub const MSG_FORBIDDEN: &str = "forbidden request";
pub const ERR_ENDPOINT_DISABLED: &str = "forbidden request: endpoint is disabled";
pub const MSG_INVALID_TOKEN: &str = "invalid token";
pub const MSG_INVALID_QUERY: &str = "invalid query";
pub const ERR_SERVICE_NAME_REQUIRED: &str = "service.name is required";
pub const MSG_UNAVAILABLE: &str = "unable to retrieve connection to Kibana";
pub const MSG_NOT_MODIFIED: &str = "not modified";
pub const MSG_OK: &str = "request ok";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The route is administratively disabled.
    Forbidden,
    /// A secret token is configured and the credential is missing or wrong.
    InvalidToken,
    /// The request could not be understood.
    InvalidQuery(String),
    /// The store is unreachable and nothing usable is cached.
    Unavailable(ResolveError),
    /// The client already holds the current revision.
    NotModified { etag: String, max_age: Duration },
    Resolved {
        etag: String,
        settings: Settings,
        max_age: Duration,
    },
}

impl Outcome {
    pub fn missing_service_name() -> Self {
        Outcome::InvalidQuery(ERR_SERVICE_NAME_REQUIRED.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Forbidden => StatusCode::FORBIDDEN,
            Outcome::InvalidToken => StatusCode::UNAUTHORIZED,
            Outcome::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Outcome::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Outcome::NotModified { .. } => StatusCode::NOT_MODIFIED,
            Outcome::Resolved { .. } => StatusCode::OK,
        }
    }

    pub fn level(&self) -> DecisionLevel {
        match self {
            Outcome::NotModified { .. } | Outcome::Resolved { .. } => DecisionLevel::Info,
            _ => DecisionLevel::Error,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Outcome::Forbidden => MSG_FORBIDDEN,
            Outcome::InvalidToken => MSG_INVALID_TOKEN,
            Outcome::InvalidQuery(_) => MSG_INVALID_QUERY,
            Outcome::Unavailable(_) => MSG_UNAVAILABLE,
            Outcome::NotModified { .. } => MSG_NOT_MODIFIED,
            Outcome::Resolved { .. } => MSG_OK,
        }
    }

    /// Detail for the decision record.
    pub fn error(&self) -> Option<String> {
        match self {
            Outcome::Forbidden => Some(ERR_ENDPOINT_DISABLED.to_string()),
            Outcome::InvalidToken => Some(MSG_INVALID_TOKEN.to_string()),
            Outcome::InvalidQuery(reason) => Some(reason.clone()),
            Outcome::Unavailable(err) => Some(err.to_string()),
            Outcome::NotModified { .. } | Outcome::Resolved { .. } => None,
        }
    }

    pub fn decision_record(&self, url: String, request_id: String) -> DecisionRecord {
        DecisionRecord {
            level: self.level(),
            message: self.message().to_string(),
            error: self.error(),
            response_code: self.status().as_u16(),
            url,
            request_id,
        }
    }
}

fn cache_headers(etag: &str, max_age: Duration) -> [(header::HeaderName, HeaderValue); 2] {
    let etag = HeaderValue::from_str(etag).unwrap_or_else(|_| {
        tracing::warn!(etag, "ETag is not a valid header value, conditional requests will miss");
        HeaderValue::from_static("\"\"")
    });
    let cache_control = HeaderValue::from_str(&format!("max-age={}, must-revalidate", max_age.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static("must-revalidate"));
    [(header::ETAG, etag), (header::CACHE_CONTROL, cache_control)]
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Outcome::Resolved { etag, settings, max_age } => {
                (status, cache_headers(&etag, max_age), Json(settings)).into_response()
            }
            Outcome::NotModified { etag, max_age } => {
                (status, cache_headers(&etag, max_age)).into_response()
            }
            // Store internals stay in the log; clients get the summary.
            Outcome::Unavailable(_) => {
                (status, Json(json!({ "error": MSG_UNAVAILABLE }))).into_response()
            }
            other => {
                let error = other.error().unwrap_or_default();
                (status, Json(json!({ "error": error }))).into_response()
            }
        }
    }
}
