//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps endpoint settings (kill switches, secret token)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Cache and store settings are fixed at startup; only endpoint
//!   settings are reloaded

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AgentConfigEndpoint, CacheConfig, KibanaConfig, ListenerConfig,
    ObservabilityConfig, ServerConfig, TimeoutConfig,
};
