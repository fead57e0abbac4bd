//! Callback delivery
//!
//! Each chunk is posted to the callback endpoint as a JSON array. Only after
//! the endpoint acknowledges it with a 2xx status is the checkpoint advanced
//! past the chunk's last record, so a failed or interrupted run redelivers from
//! the first unacknowledged chunk (at-least-once).

pub mod sink;

pub use sink::{DeliveryReceipt, DeliverySink};

use crate::resume::ResumeError;

/// Delivery errors
///
/// All are fatal for the rest of the run: later chunks are not attempted.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Nothing to post
    #[error("refusing to deliver an empty chunk")]
    EmptyChunk,

    /// Callback answered with a non-success status
    #[error("callback rejected chunk with HTTP {status}: {body}")]
    Rejected {
        /// Status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Connection failure or timeout
    #[error("callback transport error: {0}")]
    Transport(String),

    /// Chunk was accepted but its checkpoint could not be stored
    #[error("chunk delivered but checkpoint not stored: {0}")]
    Checkpoint(#[from] ResumeError),
}
