//! Delivery sink with per-chunk checkpoint commit

use reqwest::{Client, Url};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::batch::TimedRecord;
use crate::delivery::DeliveryError;
use crate::fetcher::reporting_http::truncate_body;
use crate::metrics;
use crate::resume::{Checkpoint, CheckpointStore};

/// Outcome of one successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Records accepted by the callback
    pub records_posted: usize,
    /// Checkpoint following the chunk's last record
    pub checkpoint: Checkpoint,
    /// Whether the checkpoint was written (false if it did not advance)
    pub committed: bool,
}

/// Posts chunks to the callback and commits the checkpoint after each one
pub struct DeliverySink {
    client: Client,
    callback_url: Url,
    store: CheckpointStore,
    committed: Option<Checkpoint>,
}

impl DeliverySink {
    /// Create a sink
    ///
    /// # Arguments
    /// * `client` - HTTP client; its timeout bounds every POST
    /// * `callback_url` - Receiver of the chunks
    /// * `store` - Checkpoint store updated after each acknowledged chunk
    /// * `committed` - Checkpoint read at run start, if any
    pub fn new(
        client: Client,
        callback_url: Url,
        store: CheckpointStore,
        committed: Option<Checkpoint>,
    ) -> Self {
        Self {
            client,
            callback_url,
            store,
            committed,
        }
    }

    /// Last checkpoint known to be stored
    pub fn committed(&self) -> Option<Checkpoint> {
        self.committed
    }

    /// Post one ordered chunk and commit its checkpoint
    ///
    /// The checkpoint is written strictly after the callback's 2xx response.
    /// A checkpoint that would not move past the stored one is skipped, so the
    /// stored value never decreases.
    ///
    /// # Errors
    /// Returns [`DeliveryError::Rejected`] or [`DeliveryError::Transport`] if
    /// the POST fails (the stored checkpoint is untouched), and
    /// [`DeliveryError::Checkpoint`] if the write after a successful POST
    /// fails.
    pub async fn deliver(&mut self, chunk: &[TimedRecord]) -> Result<DeliveryReceipt, DeliveryError> {
        let last = chunk.last().ok_or(DeliveryError::EmptyChunk)?;

        debug!(url = %self.callback_url, records = chunk.len(), "Posting chunk to callback");

        let started = Instant::now();
        let result = self
            .client
            .post(self.callback_url.clone())
            .json(chunk)
            .send()
            .await;
        metrics::record_http_duration("callback", started.elapsed());

        let response = result.map_err(|e| {
            metrics::record_delivery_failure();
            let kind = if e.is_timeout() { "timeout" } else { "transport" };
            error!(error = %e, kind, "Failed to send data to callback URL");
            DeliveryError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::record_delivery_failure();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            error!(status = status.as_u16(), "Callback URL rejected data");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        metrics::record_delivery(chunk.len());
        info!(
            status = status.as_u16(),
            records = chunk.len(),
            "Data successfully sent to callback URL"
        );

        let checkpoint = Checkpoint::after_event(last.event_time());
        let committed = match self.committed {
            Some(previous) if checkpoint <= previous => {
                warn!(
                    checkpoint = %checkpoint,
                    stored = %previous,
                    "Chunk does not advance the checkpoint, keeping stored value"
                );
                false
            }
            _ => {
                self.store.write(&checkpoint).map_err(|e| {
                    error!(error = %e, path = %self.store.path().display(), "Failed to store checkpoint");
                    e
                })?;
                metrics::record_checkpoint_write();
                self.committed = Some(checkpoint);
                true
            }
        };

        Ok(DeliveryReceipt {
            records_posted: chunk.len(),
            checkpoint,
            committed,
        })
    }
}
