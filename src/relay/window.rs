//! Query time window resolution

use crate::relay::config::DEFAULT_LOOKBACK_DAYS;
use crate::resume::Checkpoint;
use crate::timestamp::{format_wire, truncate_millis};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{info, warn};

/// Half-open interval `[start, end)` of event times queried in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Resolve the window for a run starting at `now`
    ///
    /// `end` is `now` truncated to milliseconds. `start` is the stored
    /// checkpoint, or `end` minus [`DEFAULT_LOOKBACK_DAYS`] on a first run. A
    /// checkpoint lying past `end` (clock skew) is clamped to `end`, yielding
    /// an empty window.
    pub fn resolve(checkpoint: Option<&Checkpoint>, now: DateTime<Utc>) -> Self {
        let end = truncate_millis(now);
        let start = match checkpoint {
            Some(cp) if cp.instant() > end => {
                warn!(
                    checkpoint = %cp,
                    now = %format_wire(end),
                    "Checkpoint is in the future, clamping window start to now"
                );
                end
            }
            Some(cp) => cp.instant(),
            None => {
                info!(
                    days = DEFAULT_LOOKBACK_DAYS,
                    "No checkpoint found, querying default lookback"
                );
                end - Duration::days(DEFAULT_LOOKBACK_DAYS)
            }
        };
        Self { start, end }
    }

    /// Window with explicit bounds, or `None` when `start > end`
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        let (start, end) = (truncate_millis(start), truncate_millis(end));
        (start <= end).then_some(Self { start, end })
    }

    /// Inclusive lower bound
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// `from` query parameter value
    pub fn from_param(&self) -> String {
        format_wire(self.start)
    }

    /// `to` query parameter value
    pub fn to_param(&self) -> String {
        format_wire(self.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from_param(), self.to_param())
    }
}
