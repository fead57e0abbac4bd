//! Reporting API access
//!
//! - [`endpoint`] - the two endpoint variants and their URLs
//! - [`job`] - protocol state of a job query
//! - [`reporting_http`] - authenticated request/response handling
//! - [`pagination`] - the polling state machine that drives a job to completion

pub mod endpoint;
pub mod job;
pub mod pagination;
pub mod reporting_http;

pub use endpoint::EndpointKind;
pub use job::{JobQueryState, JobResponse, JobStatus, JobTransition};
pub use pagination::{JobPoller, PollOutcome};
pub use reporting_http::ReportingHttpClient;

/// Fetcher errors
///
/// Every variant is fatal for the current run. [`FetcherError::NetworkError`]
/// is the only one after which records already collected are still usable.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// 400: the service rejected the query parameters
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 401/403: API key invalid or not authorized
    #[error("API key invalid (HTTP {0})")]
    InvalidCredentials(u16),

    /// Any other non-success status
    #[error("HTTP error {status}: {body}")]
    HttpError {
        /// Status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response missing `jobId`/`status` or not decodable
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Connection failure or timeout
    #[error("network error: {0}")]
    NetworkError(String),

    /// Job query issued more requests than allowed
    #[error("poll limit exceeded: job not exhausted after {0} requests")]
    PollLimitExceeded(usize),

    /// Shutdown requested while polling
    #[error("polling cancelled by shutdown request")]
    Cancelled,
}

impl FetcherError {
    /// Build a network error from a transport failure
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetcherError::NetworkError(format!("request timed out: {err}"))
        } else {
            FetcherError::NetworkError(err.to_string())
        }
    }

    /// Whether this is a transport-level failure
    pub fn is_transport(&self) -> bool {
        matches!(self, FetcherError::NetworkError(_))
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;
