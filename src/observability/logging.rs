//! Structured logging setup.
//!
//! `RUST_LOG` overrides the configured level. JSON output flattens event
//! fields to the top level. Decision records bypass the JSON formatter and
//! are written by `DecisionLogLayer` as
//! `{"level":"error","message":..,"response_code":..}`.

use tracing::Subscriber;
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::ObservabilityConfig;
use crate::observability::decision::{DecisionLogLayer, DECISION_TARGET};

pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "agent_config_server={level},{target}={level},tower_http=info",
            level = config.log_level,
            target = DECISION_TARGET,
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.log_json {
        registry.with(json_layers(std::io::stdout)).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}

/// JSON formatter for ordinary events plus the decision record writer.
pub fn json_layers<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Clone + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_writer(make_writer.clone())
        .with_filter(filter_fn(|meta| meta.target() != DECISION_TARGET))
        .and_then(DecisionLogLayer::new(make_writer))
}
