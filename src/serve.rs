//! Response policy for cache hits: conditional-request evaluation and the
//! header set a served entry carries.

use std::time::SystemTime;

use crate::http_time;

/// Cache policy advertised on every served entry.
pub const CACHE_CONTROL_POLICY: &str = "public,max-age=600";

/// How a Fresh request should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOutcome {
    /// Stream the entry body with a 200.
    ServeBody,
    /// The client's copy is current: 304, no body.
    NotModified,
}

/// Evaluate `If-Modified-Since` against the entry's modification time.
///
/// The header is honored only when it parses in strict RFC1123 form and
/// names a time at or after the entry's mtime. Anything else (absent,
/// malformed, or older) serves the body.
pub fn evaluate_conditional(
    if_modified_since: Option<&str>,
    local_modified: SystemTime,
) -> ConditionalOutcome {
    match if_modified_since.and_then(http_time::parse_strict) {
        Some(client_time) if client_time >= local_modified => ConditionalOutcome::NotModified,
        _ => ConditionalOutcome::ServeBody,
    }
}

/// Quote an ETag value unless it is already quoted.
pub fn ensure_quoted(etag: &str) -> String {
    if etag.ends_with('"') {
        etag.to_string()
    } else {
        format!("\"{}\"", etag)
    }
}
