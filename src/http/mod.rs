//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, reload)
//!     → request.rs (request ID)
//!     → agent_config.rs (kill switch, auth, params, resolve, ETag, filter)
//!     → outcome.rs (status, decision record, response)
//!     → Send to client
//! ```

pub mod agent_config;
pub mod auth;
pub mod outcome;
pub mod request;
pub mod server;

pub use agent_config::{EndpointSettings, BACKEND_PATH, RUM_PATH};
pub use outcome::Outcome;
pub use server::{AppState, HttpServer};
