//! # Usage Event Relay Library
//!
//! Pulls usage events from a job-based reporting API and forwards them, in
//! time order and bounded batches, to a downstream HTTP callback. Progress is
//! persisted as a durable watermark so the next run resumes where the last
//! delivered batch ended.
//!
//! ## Features
//!
//! - **Job Polling**: Drives the asynchronous report job until completion,
//!   following job and page tokens
//! - **Ordering & Batching**: Stable sort by event time, fixed-size chunks
//! - **Checkpointed Delivery**: The watermark advances only after a chunk is
//!   accepted downstream (at-least-once)
//! - **Two Endpoints**: `WEB` and `URL` isolation reporting variants
//!
//! ## Quick Start
//!
//! ```no_run
//! use usage_event_relay::fetcher::EndpointKind;
//! use usage_event_relay::identifier::RunIdentifier;
//! use usage_event_relay::relay::{RelayConfig, RelayExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::builder(
//!     EndpointKind::Web,
//!     "api-key",
//!     RunIdentifier::parse("web-usage")?,
//!     "https://collector.example.com/events",
//! )
//! .chunk_size(500)
//! .build()?;
//!
//! let report = RelayExecutor::new(config)?.run().await?;
//! println!("delivered {} records", report.records_delivered);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - Reporting API client and the job polling state machine
//! - [`batch`] - Time ordering and chunking of the collected records
//! - [`delivery`] - Callback sink that commits a checkpoint per delivered chunk
//! - [`resume`] - Checkpoint persistence with atomic writes
//! - [`relay`] - Run configuration, time window and orchestration
//! - [`cli`] - Command-line surface
//! - [`logging`] - Subscriber setup for console and per-identifier log file
//! - [`metrics`] - Counters and optional Prometheus exporter

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Record ordering and chunking
pub mod batch;

/// Command-line surface
pub mod cli;

/// Callback delivery with checkpoint commit
pub mod delivery;

/// Reporting API access and job polling
pub mod fetcher;

/// Run identifier parsing and validation
pub mod identifier;

/// Tracing subscriber setup
pub mod logging;

/// Relay metrics
pub mod metrics;

/// Run orchestration
pub mod relay;

/// Checkpoint persistence
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Wire timestamp parsing and formatting
pub mod timestamp;

pub use identifier::RunIdentifier;

/// Name of the field carrying the event time of a record
pub const DATE_FIELD: &str = "date";

/// Application name reported in logs and the HTTP user agent
pub const APP_NAME: &str = "usage-event-relay";

/// A single usage event as returned by the reporting API
///
/// The record is opaque: it is forwarded downstream exactly as received. Only
/// the [`DATE_FIELD`] is interpreted, for ordering and checkpointing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageRecord(Map<String, Value>);

impl UsageRecord {
    /// Raw `date` value, if present and a string
    pub fn date(&self) -> Option<&str> {
        self.0.get(DATE_FIELD).and_then(Value::as_str)
    }

    /// Parsed event time
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the `date` field is missing,
    /// not a string, or not a recognizable timestamp.
    pub fn event_time(&self) -> Result<DateTime<Utc>, String> {
        match self.0.get(DATE_FIELD) {
            None => Err(format!("record has no '{DATE_FIELD}' field")),
            Some(Value::String(raw)) => timestamp::parse_timestamp(raw)
                .ok_or_else(|| format!("unparseable {DATE_FIELD} {raw:?}")),
            Some(other) => Err(format!("'{DATE_FIELD}' is not a string: {other}")),
        }
    }

    /// All fields of the record
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for UsageRecord {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(format!("usage record must be a JSON object, got {other}")),
        }
    }
}
