//! Admin API, served on its own listener.
//!
//! `GET /admin/status` reports version and endpoint switches,
//! `GET /admin/cache` reports cache counters. Both require
//! `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState, api_key: &str) -> Router {
    let api_key: Arc<str> = Arc::from(api_key);
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache))
        .route_layer(middleware::from_fn_with_state(api_key, admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::http::HttpServer;
    use crate::store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        let mut config = ServerConfig::default();
        config.kibana.enabled = true;
        let server = HttpServer::new(config, Arc::new(MemoryStore::new()));
        setup_admin_router(server.state().clone(), "admin-key")
    }

    #[tokio::test]
    async fn test_requires_api_key() {
        let response = router()
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router()
            .oneshot(
                Request::get("/admin/status")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_and_cache() {
        let response = router()
            .oneshot(
                Request::get("/admin/status")
                    .header(header::AUTHORIZATION, "Bearer admin-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: SystemStatus = serde_json::from_slice(&bytes).unwrap();
        assert!(status.endpoint_enabled);
        assert!(!status.auth_required);
        assert_eq!(status.cache_ttl_ms, 30_000);

        let response = router()
            .oneshot(
                Request::get("/admin/cache")
                    .header(header::AUTHORIZATION, "Bearer admin-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stats["entries"], 0);
        assert_eq!(stats["store_fetches"], 0);
    }
}
