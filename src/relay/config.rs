//! Relay configuration: constants and the validated run configuration

use crate::fetcher::EndpointKind;
use crate::identifier::{IdentifierError, RunIdentifier};
use reqwest::Url;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of records per delivery chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Default number of records requested per API page
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Accepted range for chunk and page sizes
pub const BATCH_SIZE_RANGE: RangeInclusive<usize> = 1..=10_000;

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Accepted range for the HTTP timeout in seconds
pub const TIMEOUT_SECS_RANGE: RangeInclusive<u64> = 1..=3_600;

/// Default delay between polls of a job that is still processing
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Upper bound for the poll interval
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Maximum requests issued for a single job query before giving up
pub const MAX_POLL_REQUESTS: usize = 10_000;

/// Query window length used when no checkpoint exists
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Distance between the last delivered event and the stored checkpoint
pub const CHECKPOINT_ADVANCE_MS: i64 = 1_000;

/// API key wrapper that never prints its value
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a secret
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Secret value, for building the `Authorization` header only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Immutable configuration for one relay run
///
/// Built through [`RelayConfig::builder`]; every field is validated once in
/// [`RelayConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    endpoint: EndpointKind,
    api_key: ApiKey,
    identifier: RunIdentifier,
    base_url: Url,
    callback_url: Url,
    chunk_size: usize,
    page_size: usize,
    timeout: Duration,
    poll_interval: Duration,
    max_polls: usize,
    checkpoint_dir: PathBuf,
}

impl RelayConfig {
    /// Start building a configuration from the required settings
    pub fn builder(
        endpoint: EndpointKind,
        api_key: impl Into<String>,
        identifier: RunIdentifier,
        callback_url: impl Into<String>,
    ) -> RelayConfigBuilder {
        RelayConfigBuilder {
            endpoint,
            api_key: api_key.into(),
            identifier,
            callback_url: callback_url.into(),
            base_url: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: MAX_POLL_REQUESTS,
            checkpoint_dir: PathBuf::from("."),
        }
    }

    /// Selected reporting endpoint
    pub fn endpoint(&self) -> EndpointKind {
        self.endpoint
    }

    /// API key for the reporting endpoint
    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Run identifier
    pub fn identifier(&self) -> &RunIdentifier {
        &self.identifier
    }

    /// Reporting API URL (endpoint default or override)
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Downstream callback URL
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    /// Records per delivery chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Records requested per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Timeout applied to every HTTP request
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay between polls of a job that is still processing
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Request budget for a single job query
    pub fn max_polls(&self) -> usize {
        self.max_polls
    }

    /// Directory holding the checkpoint file
    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }
}

/// Builder for [`RelayConfig`]
#[derive(Debug)]
pub struct RelayConfigBuilder {
    endpoint: EndpointKind,
    api_key: String,
    identifier: RunIdentifier,
    callback_url: String,
    base_url: Option<String>,
    chunk_size: usize,
    page_size: usize,
    timeout_secs: u64,
    poll_interval_ms: u64,
    max_polls: usize,
    checkpoint_dir: PathBuf,
}

impl RelayConfigBuilder {
    /// Records per delivery chunk (1-10000)
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Records requested per page (1-10000)
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// HTTP timeout in seconds (1-3600)
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Delay between polls of an unfinished job, in milliseconds (0-60000)
    pub fn poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Request budget for one job query
    pub fn max_polls(mut self, max_polls: usize) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Directory holding the checkpoint file
    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Replace the endpoint's reporting URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Validate and freeze the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn build(self) -> Result<RelayConfig, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }

        if !BATCH_SIZE_RANGE.contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if !BATCH_SIZE_RANGE.contains(&self.page_size) {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }

        if !TIMEOUT_SECS_RANGE.contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidPollInterval(self.poll_interval_ms));
        }

        if self.max_polls == 0 {
            return Err(ConfigError::InvalidPollLimit);
        }

        let base_url = match self.base_url {
            Some(url) => parse_http_url("api-url", &url)?,
            None => parse_http_url("endpoint", self.endpoint.base_url())?,
        };
        let callback_url = parse_http_url("target", &self.callback_url)?;

        Ok(RelayConfig {
            endpoint: self.endpoint,
            api_key: ApiKey(self.api_key),
            identifier: self.identifier,
            base_url,
            callback_url,
            chunk_size: self.chunk_size,
            page_size: self.page_size,
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_polls: self.max_polls,
            checkpoint_dir: self.checkpoint_dir,
        })
    }
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: format!("{raw:?}: {e}"),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            field,
            reason: format!("unsupported scheme {scheme:?}, expected http or https"),
        }),
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// API key missing or blank
    #[error("API key cannot be empty")]
    EmptyApiKey,

    /// Run identifier unusable as a file name
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    /// Chunk size out of range
    #[error("chunk size {0} out of range (1-10000)")]
    InvalidChunkSize(usize),

    /// Page size out of range
    #[error("page size {0} out of range (1-10000)")]
    InvalidPageSize(usize),

    /// Timeout out of range
    #[error("timeout {0}s out of range (1-3600)")]
    InvalidTimeout(u64),

    /// Poll interval out of range
    #[error("poll interval {0}ms out of range (0-60000)")]
    InvalidPollInterval(u64),

    /// Poll limit of zero
    #[error("poll request limit must be at least 1")]
    InvalidPollLimit,

    /// Malformed or non-HTTP URL
    #[error("invalid {field} URL: {reason}")]
    InvalidUrl {
        /// Setting the URL came from
        field: &'static str,
        /// Parse failure detail
        reason: String,
    },
}
