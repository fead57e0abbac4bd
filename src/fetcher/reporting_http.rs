//! Reporting API HTTP client
//!
//! Issues the authenticated `GET` for one step of a job query and classifies
//! the outcome:
//! - 2xx: body decoded into a [`JobResponse`]
//! - 400: malformed request
//! - 401/403: invalid API key
//! - any other status: unknown failure
//! - connection failure or timeout: network error (caller keeps partial data)
//!
//! Nothing is retried here; every failure is final for the run.

use reqwest::{Client, StatusCode, Url};
use std::time::Instant;
use tracing::{debug, error};

use crate::fetcher::job::JobResponse;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics;
use crate::relay::config::ApiKey;

/// Maximum number of response body characters kept in error messages
const ERROR_BODY_LIMIT: usize = 512;

/// Client for the usage-data reporting endpoint
#[derive(Clone)]
pub struct ReportingHttpClient {
    client: Client,
    url: Url,
    api_key: ApiKey,
}

impl ReportingHttpClient {
    /// Create a client for `url`
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client; its timeout bounds every request
    /// * `url` - Usage-data URL of the selected endpoint
    /// * `api_key` - Sent as `Authorization: Bearer <key>`
    pub fn new(client: Client, url: Url, api_key: ApiKey) -> Self {
        Self {
            client,
            url,
            api_key,
        }
    }

    /// Reporting URL this client talks to
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Execute one request of a job query
    ///
    /// # Errors
    /// Returns [`FetcherError::NetworkError`] on transport failures,
    /// a status-specific error on non-2xx responses and
    /// [`FetcherError::InvalidResponse`] if the body is not the expected JSON.
    pub async fn fetch_page(&self, params: &[(&'static str, String)]) -> FetcherResult<JobResponse> {
        debug!(url = %self.url, params = params.len(), "Querying reporting API");

        let started = Instant::now();
        let result = self
            .client
            .get(self.url.clone())
            .query(params)
            .bearer_auth(self.api_key.expose())
            .send()
            .await;
        metrics::record_http_duration("reporting", started.elapsed());

        let response = result.map_err(|e| {
            let err = FetcherError::from_transport(&e);
            error!(error = %err, "Call to reporting API failed");
            err
        })?;

        let status = response.status();
        metrics::record_poll_request(status.as_u16());

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let err = classify_status(status, truncate_body(&body));
            error!(status = status.as_u16(), error = %err, "Reporting API request rejected");
            return Err(err);
        }

        debug!(status = status.as_u16(), "Reporting API successfully queried");

        let body = response.text().await.map_err(|e| {
            let err = FetcherError::from_transport(&e);
            error!(error = %err, "Failed to read reporting API response body");
            err
        })?;

        serde_json::from_str::<JobResponse>(&body).map_err(|e| {
            error!(error = %e, "Reporting API returned an undecodable body");
            FetcherError::InvalidResponse(format!("Failed to decode response: {e}"))
        })
    }
}

/// Map a non-success status to its error kind
pub fn classify_status(status: StatusCode, body: String) -> FetcherError {
    match status.as_u16() {
        400 => FetcherError::BadRequest(body),
        401 | 403 => FetcherError::InvalidCredentials(status.as_u16()),
        code => FetcherError::HttpError { status: code, body },
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
