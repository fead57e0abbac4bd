//! Job polling state machine
//!
//! Drives one job query to exhaustion:
//!
//! 1. Open the job with `from`, `to` and `pageSize`
//! 2. While the status is not `COMPLETED`, wait the poll interval and re-issue
//!    the same request (echoing `jobId`)
//! 3. Once completed, collect the page's `data` and follow `pageToken` until a
//!    completed response arrives without one
//!
//! Non-success statuses and protocol violations abort the query. A transport
//! failure ends it early but keeps the records collected so far.
//!
//! Includes safety mechanisms:
//! - Maximum request budget to prevent infinite loops
//! - Cooperative cancellation between requests

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::fetcher::job::{JobQueryState, JobTransition};
use crate::fetcher::reporting_http::ReportingHttpClient;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics;
use crate::relay::TimeWindow;
use crate::shutdown::SharedShutdown;
use crate::UsageRecord;

/// Result of a job query
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Unordered records from every page
    pub records: Vec<UsageRecord>,
    /// Pages that carried at least one record
    pub pages: usize,
    /// Requests issued, including polls of a processing job
    pub requests: usize,
    /// Job identifier assigned by the service
    pub job_id: Option<String>,
    /// Transport failure that cut the query short, if any
    pub interruption: Option<FetcherError>,
}

impl PollOutcome {
    /// Whether the query ran to exhaustion
    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Drives a job query against the reporting API
pub struct JobPoller<'a> {
    http: &'a ReportingHttpClient,
    page_size: usize,
    poll_interval: Duration,
    max_requests: usize,
    shutdown: Option<SharedShutdown>,
}

impl<'a> JobPoller<'a> {
    /// Create a poller
    ///
    /// # Arguments
    /// * `http` - Reporting API client
    /// * `page_size` - Records per page requested from the service
    /// * `poll_interval` - Wait between polls of a processing job
    /// * `max_requests` - Request budget for the whole query
    pub fn new(
        http: &'a ReportingHttpClient,
        page_size: usize,
        poll_interval: Duration,
        max_requests: usize,
    ) -> Self {
        Self {
            http,
            page_size,
            poll_interval,
            max_requests,
            shutdown: None,
        }
    }

    /// Attach a shutdown handle checked between requests
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run the job query for `window` to exhaustion
    ///
    /// # Returns
    /// All records of the query. If a transport failure ended the query early,
    /// the records gathered up to that point are returned together with the
    /// failure in [`PollOutcome::interruption`].
    ///
    /// # Errors
    /// Returns the classified error on non-success statuses, missing
    /// `jobId`/`status`, exhaustion of the request budget, or cancellation.
    pub async fn poll(&self, window: &TimeWindow) -> FetcherResult<PollOutcome> {
        let mut state = JobQueryState::new();
        let mut outcome = PollOutcome::default();

        info!(from = %window.from_param(), to = %window.to_param(), page_size = self.page_size, "Starting job query");

        loop {
            if outcome.requests >= self.max_requests {
                error!(requests = outcome.requests, job_id = ?state.job_id(), "Job query exceeded request budget");
                return Err(FetcherError::PollLimitExceeded(self.max_requests));
            }

            if self.is_shutdown_requested() {
                warn!(records = outcome.records.len(), "Shutdown requested, abandoning job query");
                return Err(FetcherError::Cancelled);
            }

            let params = state.query_params(window, self.page_size);
            outcome.requests += 1;

            let mut response = match self.http.fetch_page(&params).await {
                Ok(response) => response,
                Err(e) if e.is_transport() => {
                    error!(
                        error = %e,
                        records = outcome.records.len(),
                        "Job query interrupted, keeping records collected so far"
                    );
                    outcome.interruption = Some(e);
                    return Ok(outcome);
                }
                Err(e) => return Err(e),
            };

            let transition = state.apply(&response).map_err(|e| {
                error!(error = %e, "Reporting API protocol violation");
                e
            })?;
            outcome.job_id = state.job_id().map(str::to_string);

            debug!(
                job_id = ?state.job_id(),
                page_token = ?state.page_token(),
                status = ?state.status(),
                "Job state updated"
            );

            if transition == JobTransition::Processing {
                debug!("Polling until status is COMPLETED");
                self.wait_before_next_poll().await?;
                continue;
            }

            let expected_pages = response
                .total
                .map(|total| total.div_ceil(self.page_size as u64).max(1));
            if let Some(total) = response.total {
                debug!(total, "Total records reported by the service");
            }

            let data = response.data.take().unwrap_or_default();
            info!(records = data.len(), "Data records received");
            if !data.is_empty() {
                outcome.pages += 1;
                match expected_pages {
                    Some(pages) => info!("Page: {} of {}", outcome.pages, pages),
                    None => info!("Page: {}", outcome.pages),
                }
                metrics::record_page(data.len());
                outcome.records.extend(data);
            }

            if transition == JobTransition::Exhausted {
                break;
            }
        }

        info!(
            requests = outcome.requests,
            pages = outcome.pages,
            records = outcome.records.len(),
            "Job query completed"
        );

        Ok(outcome)
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|shutdown| shutdown.is_shutdown_requested())
    }

    async fn wait_before_next_poll(&self) -> FetcherResult<()> {
        if self.poll_interval.is_zero() {
            return Ok(());
        }

        match &self.shutdown {
            Some(shutdown) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => Ok(()),
                    _ = shutdown.wait_for_shutdown() => Err(FetcherError::Cancelled),
                }
            }
            None => {
                tokio::time::sleep(self.poll_interval).await;
                Ok(())
            }
        }
    }
}
