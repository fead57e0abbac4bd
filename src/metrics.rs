//! Relay metrics
//!
//! Counters and histograms for the poll/deliver pipeline, recorded through the
//! `metrics` facade. Without an installed recorder every call is a no-op, so
//! library code records unconditionally. The binary installs the Prometheus
//! exporter only when a scrape address is configured.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

static METRICS_ADDR: OnceCell<SocketAddr> = OnceCell::new();

/// Errors installing the metrics exporter
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (address in use, recorder already set)
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    Install {
        /// Requested listen address
        addr: SocketAddr,
        /// Failure detail
        reason: String,
    },
}

/// Install the Prometheus exporter listening on `addr`
///
/// Must be called from within a Tokio runtime. Idempotent: later calls are
/// ignored once an exporter is running.
///
/// # Errors
/// Returns [`MetricsError::Install`] if the listener cannot be started.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_ADDR.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            reason: e.to_string(),
        })?;

    describe_metrics();
    let _ = METRICS_ADDR.set(addr);
    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// Whether an exporter has been installed by this process
pub fn is_initialized() -> bool {
    METRICS_ADDR.get().is_some()
}

fn describe_metrics() {
    describe_counter!(
        "relay_poll_requests_total",
        Unit::Count,
        "Requests sent to the reporting API, by HTTP status"
    );
    describe_counter!(
        "relay_pages_total",
        Unit::Count,
        "Pages with data received from the reporting API"
    );
    describe_counter!(
        "relay_records_fetched_total",
        Unit::Count,
        "Records received from the reporting API"
    );
    describe_counter!(
        "relay_chunks_delivered_total",
        Unit::Count,
        "Chunks accepted by the callback endpoint"
    );
    describe_counter!(
        "relay_records_delivered_total",
        Unit::Count,
        "Records accepted by the callback endpoint"
    );
    describe_counter!(
        "relay_delivery_failures_total",
        Unit::Count,
        "Chunk deliveries that failed"
    );
    describe_counter!(
        "relay_checkpoint_writes_total",
        Unit::Count,
        "Checkpoints committed"
    );
    describe_histogram!(
        "relay_http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration, by target"
    );
    describe_gauge!(
        "relay_last_run_records_delivered",
        Unit::Count,
        "Records delivered by the most recent run"
    );
}

/// Record a reporting API response status
pub fn record_poll_request(status: u16) {
    counter!("relay_poll_requests_total", "status" => status.to_string()).increment(1);
}

/// Record a page of `records` records
pub fn record_page(records: usize) {
    counter!("relay_pages_total").increment(1);
    counter!("relay_records_fetched_total").increment(records as u64);
}

/// Record a chunk accepted downstream
pub fn record_delivery(records: usize) {
    counter!("relay_chunks_delivered_total").increment(1);
    counter!("relay_records_delivered_total").increment(records as u64);
}

/// Record a failed chunk delivery
pub fn record_delivery_failure() {
    counter!("relay_delivery_failures_total").increment(1);
}

/// Record a committed checkpoint
pub fn record_checkpoint_write() {
    counter!("relay_checkpoint_writes_total").increment(1);
}

/// Record the duration of an HTTP request against `target`
pub fn record_http_duration(target: &'static str, elapsed: Duration) {
    histogram!("relay_http_request_duration_seconds", "target" => target)
        .record(elapsed.as_secs_f64());
}

/// Record the outcome of a finished run
pub fn record_run_summary(records_delivered: usize) {
    gauge!("relay_last_run_records_delivered").set(records_delivered as f64);
}
