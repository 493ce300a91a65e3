//! Agent configuration server.
//!
//! Serves central agent configuration from Kibana to APM agents.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!   Agent         │  ┌──────────┐   ┌──────────┐   ┌───────┐   ┌──────┐  │
//!   ──────────────┼─▶│   http   │──▶│ resolve  │──▶│ cache │──▶│store │──┼──▶ Kibana
//!                 │  │ endpoint │   │ env→svc  │   │ TTL + │   │      │  │
//!   ◀─────────────┼──│ + agents │◀──│ fallback │◀──│ single│◀──│      │  │
//!   settings/304  │  └──────────┘   └──────────┘   │ flight│   └──────┘  │
//!                 │                                └───────┘             │
//!                 │  config (TOML, hot reload) · observability · admin   │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use agent_config_server::admin::setup_admin_router;
use agent_config_server::config::{load_config, watcher::ConfigWatcher, ServerConfig};
use agent_config_server::lifecycle::{signals, startup, Shutdown};
use agent_config_server::observability::{logging, metrics};
use agent_config_server::HttpServer;

#[derive(Parser)]
#[command(name = "agent-config-server")]
#[command(about = "Central agent configuration server", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve from an empty in-memory store instead of Kibana.
    #[arg(long)]
    memory_store: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "agent-config-server starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        kibana_enabled = config.kibana.enabled,
        rum_enabled = config.agent_config.rum_enabled,
        cache_expiration_ms = config.cache.expiration_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match startup::parse_address(&config.observability.metrics_address) {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(error = %e, "Metrics disabled"),
        }
    }

    let store = startup::build_store(&config, args.memory_store)?;
    let listener = startup::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config.clone(), store);

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    // The watcher handle must outlive the server.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            server.watch_config(updates);
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let admin = if config.admin.enabled {
        let admin_listener = startup::bind(&config.admin.bind_address).await?;
        let router = setup_admin_router(server.state().clone(), &config.admin.api_key);
        let mut admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        Some(tokio::spawn(async move {
            axum::serve(admin_listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await
        }))
    } else {
        None
    };

    server.run(listener, shutdown.subscribe()).await?;

    if let Some(admin) = admin {
        if let Ok(Err(e)) = admin.await {
            tracing::error!(error = %e, "Admin API stopped with error");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
