//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Agent config requests:
//!     → decision.rs (one record per request: level, message, error, response_code)
//!
//! All subsystems produce:
//!     → logging.rs (structured tracing events, text or JSON)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout log aggregation
//!     → Prometheus scrape endpoint
//! ```

pub mod decision;
pub mod logging;
pub mod metrics;

pub use decision::{
    DecisionLevel, DecisionLogLayer, DecisionRecord, DecisionSink, MemorySink, TracingSink,
    DECISION_TARGET,
};
