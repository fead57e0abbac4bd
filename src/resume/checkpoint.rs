//! Checkpoint value type
//!
//! A checkpoint is the oldest unprocessed instant, exclusive. It is always
//! held at millisecond precision so that its textual form round-trips exactly.

use crate::relay::config::CHECKPOINT_ADVANCE_MS;
use crate::timestamp::{format_wire, parse_timestamp, truncate_millis};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

/// Watermark marking the exclusive start of the next query window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(DateTime<Utc>);

impl Checkpoint {
    /// Create a checkpoint at the given instant, truncated to milliseconds
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(truncate_millis(instant))
    }

    /// Checkpoint following a delivered record with the given event time.
    ///
    /// The watermark is placed [`CHECKPOINT_ADVANCE_MS`] past the event so
    /// that the next window excludes it.
    pub fn after_event(event_time: DateTime<Utc>) -> Self {
        Self::at(event_time + Duration::milliseconds(CHECKPOINT_ADVANCE_MS))
    }

    /// The instant this checkpoint represents
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_wire(self.0))
    }
}

impl FromStr for Checkpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_timestamp(s)
            .map(Self::at)
            .ok_or_else(|| format!("invalid checkpoint timestamp: {s:?}"))
    }
}
