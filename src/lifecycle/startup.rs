//! Startup helpers.
//!
//! Startup is fail fast: any error here is fatal and reported by `main`
//! before a listener is bound.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::store::{ConfigStore, KibanaStore, MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build Kibana client: {0}")]
    Store(StoreError),
}

/// The backing store: Kibana, or an empty in-process store when `memory` is set.
pub fn build_store(config: &ServerConfig, memory: bool) -> Result<Arc<dyn ConfigStore>, StartupError> {
    if memory {
        tracing::warn!("Using in-memory store; every lookup resolves to no configuration");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = KibanaStore::new(&config.kibana).map_err(StartupError::Store)?;
    Ok(Arc::new(store))
}

pub fn parse_address(address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|e: std::net::AddrParseError| StartupError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

pub async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    let addr = parse_address(address)?;
    TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { address: addr, source })
}
