//! Run orchestration
//!
//! One relay run resolves its time window from the stored checkpoint, drives
//! the job query to exhaustion, orders and chunks the records, and hands the
//! chunks to the delivery sink one at a time.
//!
//! # Components
//!
//! - [`config`] - Validated run configuration and defaults
//! - [`window`] - Query window resolution
//! - [`executor`] - The run itself
//!
//! # Error Handling
//!
//! Failures before the first delivery abort the run with a [`RelayError`] and
//! leave the checkpoint untouched. A delivery failure does not: it ends the run
//! with [`RunStatus::DeliveryFailed`] after the checkpoints of the chunks
//! already delivered have been committed.

pub mod config;
pub mod executor;
pub mod window;

pub use config::{ApiKey, ConfigError, RelayConfig, RelayConfigBuilder};
pub use executor::{RelayExecutor, RunReport, RunStatus};
pub use window::TimeWindow;

use crate::batch::BatchError;
use crate::delivery::DeliveryError;
use crate::fetcher::FetcherError;
use crate::resume::ResumeError;

/// Errors that abort a relay run
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Job query failed
    #[error("reporting API error: {0}")]
    Fetcher(#[from] FetcherError),

    /// Records could not be ordered or chunked
    #[error("batching error: {0}")]
    Batch(#[from] BatchError),

    /// Checkpoint could not be read
    #[error("checkpoint error: {0}")]
    Resume(#[from] ResumeError),

    /// Delivery failed
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
