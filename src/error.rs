// Error types module

use thiserror::Error;

/// Centralized error type for startup and wiring failures.
///
/// Request-path errors never surface through this type: freshness and
/// population failures degrade to redirects or pass-through instead of
/// failing the client response.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Configuration errors (invalid YAML, missing env vars, bad origin URL)
    #[error("configuration error: {0}")]
    Config(String),

    /// Failures constructing the shared origin HTTP client
    #[error("origin client error: {0}")]
    Origin(#[from] reqwest::Error),

    /// Local filesystem errors during startup (cache root creation)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
