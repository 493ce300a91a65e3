//! Per-request decision records.
//!
//! Every request to an agent configuration route produces exactly one
//! record. Field names and message strings are a stable contract that log
//! consumers match on.

use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};

/// `tracing` target decision records are emitted on.
pub const DECISION_TARGET: &str = "request";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionRecord {
    pub level: DecisionLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_code: u16,
    pub url: String,
    pub request_id: String,
}

/// Destination for decision records.
pub trait DecisionSink: Send + Sync {
    fn record(&self, record: DecisionRecord);
}

/// Emits records as `tracing` events on the `request` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DecisionSink for TracingSink {
    fn record(&self, record: DecisionRecord) {
        match record.level {
            DecisionLevel::Info => tracing::info!(
                target: DECISION_TARGET,
                response_code = record.response_code,
                url = %record.url,
                request_id = %record.request_id,
                "{}",
                record.message
            ),
            DecisionLevel::Error => tracing::error!(
                target: DECISION_TARGET,
                response_code = record.response_code,
                error = record.error.as_deref().unwrap_or_default(),
                url = %record.url,
                request_id = %record.request_id,
                "{}",
                record.message
            ),
        }
    }
}

/// Writes events on [`DECISION_TARGET`] as one serialized [`DecisionRecord`]
/// per line, so the JSON log carries the record's own lowercase `level`.
pub struct DecisionLogLayer<W> {
    make_writer: W,
}

impl<W> DecisionLogLayer<W> {
    pub fn new(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<S, W> Layer<S> for DecisionLogLayer<W>
where
    S: Subscriber,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != DECISION_TARGET {
            return;
        }
        let mut fields = RecordFields::default();
        event.record(&mut fields);
        let level = if *event.metadata().level() == Level::ERROR {
            DecisionLevel::Error
        } else {
            DecisionLevel::Info
        };

        if let Ok(mut line) = serde_json::to_string(&fields.into_record(level)) {
            line.push('\n');
            let _ = self.make_writer.make_writer().write_all(line.as_bytes());
        }
    }
}

/// Rebuilds a record from the fields `TracingSink` emits.
#[derive(Default)]
struct RecordFields {
    message: String,
    error: Option<String>,
    response_code: u16,
    url: String,
    request_id: String,
}

impl RecordFields {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = value,
            "error" if !value.is_empty() => self.error = Some(value),
            "url" => self.url = value,
            "request_id" => self.request_id = value,
            _ => {}
        }
    }

    fn into_record(self, level: DecisionLevel) -> DecisionRecord {
        DecisionRecord {
            level,
            message: self.message,
            error: self.error,
            response_code: self.response_code,
            url: self.url,
            request_id: self.request_id,
        }
    }
}

impl Visit for RecordFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "response_code" {
            self.response_code = u16::try_from(value).unwrap_or(u16::MAX);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "response_code" {
            self.response_code = u16::try_from(value).unwrap_or(u16::MAX);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.set(field.name(), format!("{:?}", value));
    }
}

/// Keeps records in memory, for tests and the admin API.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl DecisionSink for MemorySink {
    fn record(&self, record: DecisionRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
