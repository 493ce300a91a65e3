use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::http::server::AppState;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub endpoint_enabled: bool,
    pub rum_enabled: bool,
    pub auth_required: bool,
    pub cache_ttl_ms: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let endpoint = state.endpoint.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        endpoint_enabled: endpoint.enabled,
        rum_enabled: endpoint.rum_enabled,
        auth_required: endpoint.verifier.is_some(),
        cache_ttl_ms: state.resolver.cache().policy().ttl.as_millis() as u64,
    })
}

pub async fn get_cache(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.resolver.cache().stats())
}
