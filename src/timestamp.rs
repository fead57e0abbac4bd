//! Timestamp parsing and formatting for the reporting wire format
//!
//! The reporting API and the checkpoint file both use ISO-8601 UTC timestamps
//! with millisecond precision and no zone designator, e.g.
//! `2024-01-02T00:00:00.000`. Record `date` values are parsed leniently since
//! the service is not strict about offsets or fractional seconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};

/// Output format used for query windows and checkpoints
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Format an instant in the wire format (UTC, milliseconds, no designator)
pub fn format_wire(instant: DateTime<Utc>) -> String {
    instant.format(WIRE_FORMAT).to_string()
}

/// Truncate an instant to millisecond precision
pub fn truncate_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

/// Parse a timestamp as produced by the reporting API.
///
/// Accepts, in order:
/// - RFC 3339 with `Z` or an explicit offset (converted to UTC)
/// - offsets without a colon (`+0000`)
/// - naive `T`- or space-separated date-times, assumed UTC, with optional
///   fractional seconds
/// - date-only values, taken as midnight UTC
///
/// Returns `None` if no format matches.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
