//! Origin client: metadata probes and full-body downloads.
//!
//! The proxy never guesses at origin state. Every request that is not a
//! bypass triggers a HEAD probe, and background population re-fetches the
//! body with a GET. Both go through the [`Origin`] trait so tests can
//! script origin behavior without a network.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::config::OriginConfig;
use crate::error::ProxyError;

/// Validator and representation headers captured from an origin response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OriginMetadata {
    /// Parsed `Last-Modified`, if present and parseable. Lenient RFC 2822
    /// parsing; an unparseable value is treated as absent.
    pub last_modified: Option<DateTime<Utc>>,
    /// Raw `ETag` value, if present.
    pub etag: Option<String>,
    /// Raw `Content-Type` value, if present.
    pub content_type: Option<String>,
}

/// A downloaded origin resource: its metadata plus the full body.
#[derive(Debug, Clone)]
pub struct OriginResource {
    pub metadata: OriginMetadata,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum OriginError {
    /// The origin answered with a non-success status.
    #[error("origin returned status {0}")]
    Status(u16),

    /// The request never completed (connect failure, timeout, etc).
    #[error("origin transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Origin: Send + Sync {
    /// HEAD the resource and capture its validators.
    async fn probe(&self, path: &str) -> Result<OriginMetadata, OriginError>;

    /// GET the resource body together with its validators.
    async fn download(&self, path: &str) -> Result<OriginResource, OriginError>;
}

/// Origin client backed by reqwest, one client per timeout profile.
///
/// Probes are latency-sensitive and get the short timeout; downloads move
/// whole bodies and get the long one.
pub struct HttpOrigin {
    base_url: String,
    probe_client: reqwest::Client,
    download_client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new(config: &OriginConfig) -> Result<Self, ProxyError> {
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout))
            .build()?;

        let download_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .build()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            probe_client,
            download_client,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Extract validator headers from a successful origin response.
fn metadata_from_response(response: &reqwest::Response) -> OriginMetadata {
    let header_str = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    let last_modified = header_str("last-modified")
        .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    OriginMetadata {
        last_modified,
        etag: header_str("etag"),
        content_type: header_str("content-type"),
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn probe(&self, path: &str) -> Result<OriginMetadata, OriginError> {
        let response = self.probe_client.head(self.url_for(path)).send().await?;

        if !response.status().is_success() {
            return Err(OriginError::Status(response.status().as_u16()));
        }

        Ok(metadata_from_response(&response))
    }

    async fn download(&self, path: &str) -> Result<OriginResource, OriginError> {
        let response = self.download_client.get(self.url_for(path)).send().await?;

        if !response.status().is_success() {
            return Err(OriginError::Status(response.status().as_u16()));
        }

        let metadata = metadata_from_response(&response);
        let body = response.bytes().await?;

        Ok(OriginResource { metadata, body })
    }
}
