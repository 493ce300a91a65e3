//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the cache, resolver and decision sink from configuration
//! - Create the Axum router for the agent configuration routes
//! - Wire up middleware (request ID, tracing, timeout, concurrency limit)
//! - Apply hot-reloaded endpoint settings
//! - Serve until the shutdown signal fires

use arc_swap::ArcSwap;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::{CachePolicy, ConfigCache};
use crate::config::ServerConfig;
use crate::http::agent_config::{
    backend_agent_config, rum_agent_config, EndpointSettings, BACKEND_PATH, RUM_PATH,
};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::{DecisionSink, TracingSink};
use crate::resolve::Resolver;
use crate::store::ConfigStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub endpoint: Arc<ArcSwap<EndpointSettings>>,
    pub resolver: Resolver,
    pub decisions: Arc<dyn DecisionSink>,
}

impl AppState {
    /// Swap in the reloadable part of `config`.
    pub fn apply_config(&self, config: &ServerConfig) {
        let settings = EndpointSettings::from_config(config);
        tracing::info!(
            enabled = settings.enabled,
            rum_enabled = settings.rum_enabled,
            auth = settings.verifier.is_some(),
            "Endpoint settings applied"
        );
        self.endpoint.store(Arc::new(settings));
    }
}

/// HTTP server for the agent configuration routes.
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: ServerConfig, store: Arc<dyn ConfigStore>) -> Self {
        let policy = CachePolicy::from_config(&config.cache, &config.kibana);
        let cache = ConfigCache::new(store, policy);

        let state = AppState {
            endpoint: Arc::new(ArcSwap::from_pointee(EndpointSettings::from_config(&config))),
            resolver: Resolver::new(cache),
            decisions: Arc::new(TracingSink),
        };

        Self { config, state }
    }

    /// Replace the default `TracingSink`.
    pub fn with_decision_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.state.decisions = sink;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .route(BACKEND_PATH, get(backend_agent_config).post(backend_agent_config))
            .route(RUM_PATH, get(rum_agent_config).post(rum_agent_config))
            .with_state(self.state.clone())
            .layer(propagate_request_id_layer())
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
            .layer(GlobalConcurrencyLimitLayer::new(self.config.listener.max_connections))
    }

    /// Apply configuration reloads until the channel closes.
    pub fn watch_config(&self, mut updates: mpsc::UnboundedReceiver<ServerConfig>) -> JoinHandle<()> {
        let state = self.state.clone();
        let startup = self.config.clone();

        tokio::spawn(async move {
            while let Some(new_config) = updates.recv().await {
                if new_config.cache != startup.cache
                    || new_config.kibana.host != startup.kibana.host
                    || new_config.kibana.timeout_ms != startup.kibana.timeout_ms
                    || new_config.kibana.username != startup.kibana.username
                    || new_config.kibana.password != startup.kibana.password
                {
                    tracing::warn!("Cache and Kibana connection settings changed; restart to apply");
                }
                state.apply_config(&new_config);
            }
        })
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
