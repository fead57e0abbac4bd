//! Record ordering and chunking
//!
//! Records arrive unordered across pages. Before delivery they are sorted by
//! event time (stable, so records sharing a timestamp keep their arrival
//! order) and cut into contiguous chunks of the configured size.

use crate::UsageRecord;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::slice::Chunks;
use tracing::debug;

/// A record paired with its parsed event time
///
/// Serializes as the bare record, so a chunk of these posts exactly what the
/// reporting API returned.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedRecord {
    event_time: DateTime<Utc>,
    record: UsageRecord,
}

impl TimedRecord {
    /// Parse the record's event time
    ///
    /// # Errors
    /// Returns [`BatchError::InvalidDate`] (with index 0) if `date` is missing
    /// or unparseable.
    pub fn new(record: UsageRecord) -> Result<Self, BatchError> {
        let event_time = record
            .event_time()
            .map_err(|reason| BatchError::InvalidDate { index: 0, reason })?;
        Ok(Self { event_time, record })
    }

    /// Parsed event time
    pub fn event_time(&self) -> DateTime<Utc> {
        self.event_time
    }

    /// The original record
    pub fn record(&self) -> &UsageRecord {
        &self.record
    }
}

impl Serialize for TimedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record.serialize(serializer)
    }
}

/// Sort records ascending by event time
///
/// The sort is stable. Every record's `date` is parsed exactly once.
///
/// # Errors
/// Returns [`BatchError::InvalidDate`] for the first record whose `date` is
/// missing or unparseable; nothing is dropped silently.
pub fn order(records: Vec<UsageRecord>) -> Result<Vec<TimedRecord>, BatchError> {
    let mut timed = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            TimedRecord::new(record).map_err(|e| match e {
                BatchError::InvalidDate { reason, .. } => BatchError::InvalidDate { index, reason },
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    timed.sort_by_key(TimedRecord::event_time);

    if let (Some(first), Some(last)) = (timed.first(), timed.last()) {
        debug!(
            records = timed.len(),
            oldest = %first.event_time(),
            newest = %last.event_time(),
            "Records ordered by event time"
        );
    }

    Ok(timed)
}

/// Partition ordered records into chunks of `chunk_size`
///
/// The returned iterator is lazy, finite and can be cloned to restart. All
/// chunks hold `chunk_size` records except possibly the last.
///
/// # Errors
/// Returns [`BatchError::InvalidChunkSize`] when `chunk_size` is zero.
pub fn split(records: &[TimedRecord], chunk_size: usize) -> Result<Chunks<'_, TimedRecord>, BatchError> {
    if chunk_size == 0 {
        return Err(BatchError::InvalidChunkSize(chunk_size));
    }
    Ok(records.chunks(chunk_size))
}

/// Batching errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BatchError {
    /// A record's `date` could not be parsed
    #[error("record {index}: {reason}")]
    InvalidDate {
        /// Position of the record in the unordered set
        index: usize,
        /// Parse failure detail
        reason: String,
    },

    /// Chunk size must be at least 1
    #[error("invalid chunk size {0}: must be at least 1")]
    InvalidChunkSize(usize),
}
