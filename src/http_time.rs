//! RFC1123 date plumbing for `Last-Modified` and `If-Modified-Since`.
//!
//! Response dates are emitted in the fixed "R" form
//! (`Mon, 01 Jan 2024 00:00:00 GMT`). Incoming `If-Modified-Since` values
//! are parsed strictly against that same form; any other date syntax is
//! treated as if the header were absent.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::SystemTime;

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp in RFC1123 form for response headers.
pub fn format(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(RFC1123_FORMAT).to_string()
}

/// Strict round-trip RFC1123 parse.
///
/// Returns `None` for anything that does not match the exact "R" layout,
/// including RFC 850 and asctime dates and dates whose weekday does not
/// match the calendar date.
pub fn parse_strict(value: &str) -> Option<SystemTime> {
    NaiveDateTime::parse_from_str(value, RFC1123_FORMAT)
        .ok()
        .map(|naive| SystemTime::from(naive.and_utc()))
}
