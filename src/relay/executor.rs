//! Relay executor: one end-to-end run

use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{error, info, info_span, warn, Instrument};

use crate::batch;
use crate::delivery::{DeliveryError, DeliverySink};
use crate::fetcher::{FetcherError, JobPoller, ReportingHttpClient};
use crate::metrics;
use crate::relay::{RelayConfig, RelayError, TimeWindow};
use crate::resume::{Checkpoint, CheckpointStore};
use crate::shutdown::SharedShutdown;
use crate::APP_NAME;

/// How a run ended
#[derive(Debug)]
pub enum RunStatus {
    /// Every chunk was delivered (or there was nothing to deliver)
    Completed,
    /// A chunk could not be delivered; later chunks were not attempted
    DeliveryFailed(DeliveryError),
    /// Shutdown was requested between chunks
    Cancelled,
}

/// Summary of a finished run
#[derive(Debug)]
pub struct RunReport {
    /// Window that was queried
    pub window: TimeWindow,
    /// Records returned by the job query
    pub records_fetched: usize,
    /// Pages that carried records
    pub pages: usize,
    /// Requests issued to the reporting API
    pub requests: usize,
    /// Records accepted by the callback
    pub records_delivered: usize,
    /// Chunks accepted by the callback
    pub chunks_delivered: usize,
    /// Stored checkpoint at the end of the run
    pub checkpoint: Option<Checkpoint>,
    /// How the run ended
    pub status: RunStatus,
    /// Transport failure that cut the job query short
    pub poll_interruption: Option<FetcherError>,
}

impl RunReport {
    /// Whether the run fetched and delivered everything without failure
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed) && self.poll_interruption.is_none()
    }
}

/// Orchestrates a relay run
pub struct RelayExecutor {
    config: RelayConfig,
    client: Client,
    shutdown: Option<SharedShutdown>,
}

impl RelayExecutor {
    /// Create an executor for `config`
    ///
    /// # Errors
    /// Returns [`RelayError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("usage-event-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::HttpClient(e.to_string()))?;

        Ok(Self {
            config,
            client,
            shutdown: None,
        })
    }

    /// Attach a shared shutdown handle for graceful cancellation
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run once, using the current time as the window end
    ///
    /// # Errors
    /// See [`RelayExecutor::run_at`].
    pub async fn run(&self) -> Result<RunReport, RelayError> {
        self.run_at(Utc::now()).await
    }

    /// Run once with `now` as the window end
    ///
    /// # Errors
    /// Returns [`RelayError`] when the checkpoint cannot be read, the job query
    /// fails or a record has no usable date. Nothing has been delivered and the
    /// checkpoint is untouched in those cases. Delivery failures are reported
    /// through [`RunReport::status`] instead.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport, RelayError> {
        let span = info_span!("relay_run", identifier = %self.config.identifier());
        self.execute(now).instrument(span).await
    }

    async fn execute(&self, now: DateTime<Utc>) -> Result<RunReport, RelayError> {
        let config = &self.config;

        info!(app = APP_NAME, version = env!("CARGO_PKG_VERSION"), "Starting relay run");
        info!(
            endpoint = %config.endpoint(),
            url = %config.base_url(),
            target = %config.callback_url(),
            chunk_size = config.chunk_size(),
            page_size = config.page_size(),
            timeout_secs = config.timeout().as_secs(),
            checkpoint_dir = %config.checkpoint_dir().display(),
            "Relay configuration"
        );

        let store = CheckpointStore::new(config.checkpoint_dir(), config.identifier());
        let stored = store.read().map_err(|e| {
            error!(error = %e, path = %store.path().display(), "Failed to read checkpoint");
            e
        })?;
        if let Some(cp) = &stored {
            info!(checkpoint = %cp, "Resuming from checkpoint");
        }

        let window = TimeWindow::resolve(stored.as_ref(), now);
        info!(from = %window.from_param(), to = %window.to_param(), "Query window");

        let http = ReportingHttpClient::new(
            self.client.clone(),
            config.base_url().clone(),
            config.api_key().clone(),
        );
        let mut poller = JobPoller::new(
            &http,
            config.page_size(),
            config.poll_interval(),
            config.max_polls(),
        );
        if let Some(shutdown) = &self.shutdown {
            poller = poller.with_shutdown(shutdown.clone());
        }

        let outcome = poller.poll(&window).await?;

        let mut report = RunReport {
            window,
            records_fetched: outcome.records.len(),
            pages: outcome.pages,
            requests: outcome.requests,
            records_delivered: 0,
            chunks_delivered: 0,
            checkpoint: stored,
            status: RunStatus::Completed,
            poll_interruption: outcome.interruption,
        };

        if outcome.records.is_empty() {
            info!("No records to deliver");
            Self::finish(&report);
            return Ok(report);
        }

        let ordered = batch::order(outcome.records).map_err(|e| {
            error!(error = %e, "Failed to order records");
            e
        })?;
        let chunks = batch::split(&ordered, config.chunk_size())?;
        let total_chunks = ordered.len().div_ceil(config.chunk_size());

        let mut sink = DeliverySink::new(self.client.clone(), config.callback_url().clone(), store, stored);

        for (index, chunk) in chunks.enumerate() {
            if self.is_shutdown_requested() {
                warn!(
                    delivered_chunks = report.chunks_delivered,
                    remaining_chunks = total_chunks - index,
                    "Shutdown requested, stopping before next chunk"
                );
                report.status = RunStatus::Cancelled;
                break;
            }

            info!(chunk = index + 1, of = total_chunks, records = chunk.len(), "Delivering chunk");
            match sink.deliver(chunk).await {
                Ok(receipt) => {
                    report.records_delivered += receipt.records_posted;
                    report.chunks_delivered += 1;
                }
                Err(e) => {
                    error!(chunk = index + 1, error = %e, "Delivery failed, stopping run");
                    report.status = RunStatus::DeliveryFailed(e);
                    break;
                }
            }
        }

        report.checkpoint = sink.committed();
        Self::finish(&report);
        Ok(report)
    }

    fn finish(report: &RunReport) {
        info!("Total records processed: {}", report.records_delivered);
        if let Some(interruption) = &report.poll_interruption {
            match &report.checkpoint {
                Some(cp) => warn!(
                    error = %interruption,
                    checkpoint = %cp,
                    "Job query was interrupted, the next run starts at the checkpoint after the newest delivered record"
                ),
                None => warn!(
                    error = %interruption,
                    "Job query was interrupted before any record was delivered, the next run queries the same window start"
                ),
            }
        }
        metrics::record_run_summary(report.records_delivered);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|shutdown| shutdown.is_shutdown_requested())
    }
}
