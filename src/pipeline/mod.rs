// Request pipeline module - per-request context carried through the proxy

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Context for one HTTP request as it moves through freshness resolution
/// and response handling.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    method: String,
    path: String,
    timestamp: u64,
}

impl RequestContext {
    /// Create a new RequestContext from HTTP request information.
    /// Automatically generates a unique request ID (UUID v4) and captures
    /// the current timestamp.
    pub fn new(method: String, path: String) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            path,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Placeholder context with no request ID. Used where the framework
    /// demands a context before the request line is available; replaced
    /// with a real one as soon as it is.
    pub fn empty() -> Self {
        Self {
            request_id: String::new(),
            method: String::new(),
            path: String::new(),
            timestamp: 0,
        }
    }

    /// Get the unique request ID
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Get the HTTP method
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the capture timestamp (seconds since epoch)
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}
