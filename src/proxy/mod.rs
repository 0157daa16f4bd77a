// Proxy module - Pingora ProxyHttp implementation
// Implements the caching front for the Kagami origin mirror

use async_trait::async_trait;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{ProxyHttp, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::error::ProxyError;
use crate::freshness::{self, Verdict};
use crate::http_time;
use crate::origin::{HttpOrigin, Origin, OriginMetadata};
use crate::pipeline::RequestContext;
use crate::populate::Populator;
use crate::serve::{self, ConditionalOutcome, CACHE_CONTROL_POLICY};
use crate::store::{CacheStore, StoreError};

/// Local entries are streamed in fixed-size chunks
const STREAM_CHUNK_SIZE: usize = 8192;

/// KagamiProxy implements the Pingora ProxyHttp trait.
///
/// A request either terminates here (served from cache or redirected to
/// origin) or falls through to the upstream, which is the origin itself.
pub struct KagamiProxy {
    config: Arc<Config>,
    origin: Arc<dyn Origin>,
    store: Arc<CacheStore>,
    populator: Arc<Populator>,
    /// Origin host and port, parsed once from base_url
    origin_host: String,
    origin_port: u16,
    origin_tls: bool,
}

/// Split a base URL into (host, port, tls). The config validator has
/// already guaranteed an http or https scheme and no trailing slash.
fn parse_origin_authority(base_url: &str) -> (String, u16, bool) {
    let (tls, rest) = match base_url.strip_prefix("https://") {
        Some(rest) => (true, rest),
        None => (false, base_url.trim_start_matches("http://")),
    };

    let authority = rest.split('/').next().unwrap_or(rest);
    match authority.split_once(':') {
        Some((host, port)) => {
            let port = port.parse().unwrap_or(if tls { 443 } else { 80 });
            (host.to_string(), port, tls)
        }
        None => (authority.to_string(), if tls { 443 } else { 80 }, tls),
    }
}

impl KagamiProxy {
    /// Create a new KagamiProxy instance from configuration
    pub fn new(config: Config) -> std::result::Result<Self, ProxyError> {
        std::fs::create_dir_all(&config.cache.root)?;
        let origin = Arc::new(HttpOrigin::new(&config.origin)?);
        let store = Arc::new(CacheStore::new(config.cache.root.clone()));
        Ok(Self::with_parts(config, origin, store))
    }

    /// Assemble a proxy from pre-built parts. Tests use this to swap in a
    /// scripted origin and a temp-dir store.
    pub fn with_parts(config: Config, origin: Arc<dyn Origin>, store: Arc<CacheStore>) -> Self {
        let (origin_host, origin_port, origin_tls) =
            parse_origin_authority(&config.origin.base_url);
        let populator = Arc::new(Populator::new(Arc::clone(&origin), Arc::clone(&store)));

        Self {
            config: Arc::new(config),
            origin,
            store,
            populator,
            origin_host,
            origin_port,
            origin_tls,
        }
    }

    /// Insert a header only when the response does not already carry it.
    fn insert_if_absent(
        header: &mut ResponseHeader,
        name: &'static str,
        value: String,
    ) -> Result<()> {
        if !header.headers.contains_key(name) {
            header.insert_header(name, value)?;
        }
        Ok(())
    }

    /// Attach the validator and policy headers a cached entry is served with.
    fn apply_entry_headers(
        header: &mut ResponseHeader,
        local_modified: std::time::SystemTime,
        origin: &OriginMetadata,
    ) -> Result<()> {
        Self::insert_if_absent(header, "Last-Modified", http_time::format(local_modified))?;
        if let Some(etag) = &origin.etag {
            Self::insert_if_absent(header, "ETag", serve::ensure_quoted(etag))?;
        }
        if let Some(content_type) = &origin.content_type {
            Self::insert_if_absent(header, "Content-Type", content_type.clone())?;
        }
        Self::insert_if_absent(header, "Cache-Control", CACHE_CONTROL_POLICY.to_string())?;
        Ok(())
    }

    /// Answer a conditional hit with 304 and no body.
    async fn serve_not_modified(
        &self,
        session: &mut Session,
        local_modified: std::time::SystemTime,
        origin: &OriginMetadata,
    ) -> Result<()> {
        let mut header = ResponseHeader::build(304, None)?;
        Self::apply_entry_headers(&mut header, local_modified, origin)?;
        session.write_response_header(Box::new(header), true).await
    }

    /// Stream the cached entry with a 200. Returns Ok(false) when the file
    /// cannot be opened, letting the request fall through to the origin.
    async fn serve_entry(
        &self,
        session: &mut Session,
        ctx: &RequestContext,
        local_modified: std::time::SystemTime,
        origin: &OriginMetadata,
    ) -> Result<bool> {
        let (mut file, len) = match self.store.open(ctx.path()).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    error = %e,
                    "Cached entry vanished before serving, falling through"
                );
                return Ok(false);
            }
        };

        let mut header = ResponseHeader::build(200, None)?;
        Self::apply_entry_headers(&mut header, local_modified, origin)?;
        header.insert_header("Content-Length", len.to_string())?;

        let head_only = ctx.method() == "HEAD";
        session
            .write_response_header(Box::new(header), head_only)
            .await?;
        if head_only {
            return Ok(true);
        }

        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| {
                pingora_core::Error::explain(
                    pingora_core::ErrorType::InternalError,
                    format!("Failed to read cached entry: {}", e),
                )
            })?;
            if n == 0 {
                break;
            }
            session
                .write_response_body(Some(bytes::Bytes::copy_from_slice(&buf[..n])), false)
                .await?;
        }
        session.write_response_body(None, true).await?;

        Ok(true)
    }

    /// Send the client to the origin with a 302.
    async fn redirect_to_origin(&self, session: &mut Session, path: &str) -> Result<()> {
        let location = format!("{}{}", self.config.origin.base_url, path);
        let mut header = ResponseHeader::build(302, None)?;
        header.insert_header("Location", location)?;
        header.insert_header("Content-Length", "0")?;
        session.write_response_header(Box::new(header), true).await
    }

    /// Reject a malformed request path with a 400.
    async fn reject_bad_path(&self, session: &mut Session, ctx: &RequestContext) -> Result<()> {
        tracing::warn!(
            request_id = %ctx.request_id(),
            path = %ctx.path(),
            "Rejecting path traversal attempt"
        );

        let mut header = ResponseHeader::build(400, None)?;
        header.insert_header("Content-Type", "application/json")?;

        let error_body = serde_json::json!({
            "error": "Bad Request",
            "message": "Invalid request path",
            "status": 400
        })
        .to_string();

        header.insert_header("Content-Length", error_body.len().to_string())?;
        session
            .write_response_header(Box::new(header), false)
            .await?;
        session
            .write_response_body(Some(error_body.into()), true)
            .await
    }

    /// Stat the local entry, collapsing I/O failures to NotFound so a bad
    /// disk degrades to a redirect instead of an error response.
    async fn local_modified(&self, ctx: &RequestContext) -> std::result::Result<std::time::SystemTime, StoreError> {
        match self.store.modified(ctx.path()).await {
            Ok(modified) => Ok(modified),
            Err(StoreError::NotFound) => Err(StoreError::NotFound),
            Err(StoreError::Io(e)) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    error = %e,
                    "Failed to stat cached entry, treating as missing"
                );
                Err(StoreError::NotFound)
            }
        }
    }
}

#[async_trait]
impl ProxyHttp for KagamiProxy {
    type CTX = RequestContext;

    /// Placeholder context; request_filter fills it in from the request line
    fn new_ctx(&self) -> Self::CTX {
        RequestContext::empty()
    }

    /// Classify the request and either serve it from cache, redirect it to
    /// the origin, or let it fall through to the upstream.
    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let req = session.req_header();
        let path = req.uri.path().to_string();
        let method = req.method.to_string();
        *ctx = RequestContext::new(method, path);

        if CacheStore::is_traversal(ctx.path()) {
            self.reject_bad_path(session, ctx).await?;
            return Ok(true);
        }

        // Root and directory-shaped paths are not cacheable
        if freshness::is_bypass_path(ctx.path()) {
            return Ok(false);
        }

        let probe = self.origin.probe(ctx.path()).await;
        let local = self.local_modified(ctx).await;
        let verdict = freshness::resolve(probe, local);

        tracing::debug!(
            request_id = %ctx.request_id(),
            path = %ctx.path(),
            verdict = ?verdict,
            "Freshness resolved"
        );

        match verdict {
            Verdict::Fresh {
                local_modified,
                origin,
            } => {
                let if_modified_since = session
                    .req_header()
                    .headers
                    .get("if-modified-since")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());

                match serve::evaluate_conditional(if_modified_since.as_deref(), local_modified) {
                    ConditionalOutcome::NotModified => {
                        self.serve_not_modified(session, local_modified, &origin)
                            .await?;
                        Ok(true)
                    }
                    ConditionalOutcome::ServeBody => {
                        self.serve_entry(session, ctx, local_modified, &origin).await
                    }
                }
            }
            Verdict::Stale { .. } => {
                self.redirect_to_origin(session, ctx.path()).await?;
                self.populator.enqueue(ctx.path());
                Ok(true)
            }
            Verdict::StaleNoValidator => {
                // Unverifiable entries are never cached, so only redirect
                self.redirect_to_origin(session, ctx.path()).await?;
                Ok(true)
            }
            Verdict::Gone => {
                match self.store.remove(ctx.path()).await {
                    Ok(true) => {
                        tracing::info!(
                            request_id = %ctx.request_id(),
                            path = %ctx.path(),
                            "Removed cache entry for resource gone from origin"
                        );
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            request_id = %ctx.request_id(),
                            path = %ctx.path(),
                            error = %e,
                            "Failed to remove stale cache entry"
                        );
                    }
                }
                Ok(false) // Continue to upstream
            }
        }
    }

    /// Every fall-through goes to the origin
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let mut peer = Box::new(HttpPeer::new(
            (self.origin_host.clone(), self.origin_port),
            self.origin_tls,
            self.origin_host.clone(),
        ));

        let timeout = Duration::from_secs(self.config.origin.download_timeout);
        peer.options.connection_timeout = Some(Duration::from_secs(self.config.origin.probe_timeout));
        peer.options.read_timeout = Some(timeout);
        peer.options.write_timeout = Some(timeout);

        tracing::debug!(
            request_id = %ctx.request_id(),
            host = %self.origin_host,
            port = self.origin_port,
            tls = self.origin_tls,
            "Forwarding request to origin"
        );

        Ok(peer)
    }

    /// Rewrite the Host header so the origin sees its own authority
    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        _ctx: &mut Self::CTX,
    ) -> Result<()> {
        let host = if (self.origin_tls && self.origin_port != 443)
            || (!self.origin_tls && self.origin_port != 80)
        {
            format!("{}:{}", self.origin_host, self.origin_port)
        } else {
            self.origin_host.clone()
        };

        upstream_request.remove_header(&http::header::HOST);
        upstream_request
            .append_header(
                http::header::HOST,
                http::header::HeaderValue::from_str(&host).map_err(|e| {
                    pingora_core::Error::explain(
                        pingora_core::ErrorType::InternalError,
                        format!("Invalid host header: {}", e),
                    )
                })?,
            )
            .map_err(|e| {
                pingora_core::Error::explain(
                    pingora_core::ErrorType::InternalError,
                    format!("Failed to set host header: {}", e),
                )
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_authority_defaults() {
        assert_eq!(
            parse_origin_authority("https://assets.example.com"),
            ("assets.example.com".to_string(), 443, true)
        );
        assert_eq!(
            parse_origin_authority("http://assets.example.com"),
            ("assets.example.com".to_string(), 80, false)
        );
    }

    #[test]
    fn test_parse_origin_authority_explicit_port() {
        assert_eq!(
            parse_origin_authority("http://localhost:9000"),
            ("localhost".to_string(), 9000, false)
        );
        assert_eq!(
            parse_origin_authority("https://cdn.example.com:8443"),
            ("cdn.example.com".to_string(), 8443, true)
        );
    }

    #[test]
    fn test_insert_if_absent_respects_existing_headers() {
        let mut header = ResponseHeader::build(200, None).unwrap();
        header.insert_header("Content-Type", "text/html").unwrap();

        KagamiProxy::insert_if_absent(&mut header, "Content-Type", "image/png".to_string())
            .unwrap();
        KagamiProxy::insert_if_absent(&mut header, "Cache-Control", CACHE_CONTROL_POLICY.to_string())
            .unwrap();

        assert_eq!(
            header.headers.get("Content-Type").unwrap().to_str().unwrap(),
            "text/html"
        );
        assert_eq!(
            header.headers.get("Cache-Control").unwrap().to_str().unwrap(),
            CACHE_CONTROL_POLICY
        );
    }

    #[test]
    fn test_apply_entry_headers_full_set() {
        use std::time::{Duration, UNIX_EPOCH};

        let mut header = ResponseHeader::build(200, None).unwrap();
        let origin = OriginMetadata {
            last_modified: None,
            etag: Some("abc".to_string()),
            content_type: Some("image/png".to_string()),
        };
        let mtime = UNIX_EPOCH + Duration::from_secs(1_704_067_200);

        KagamiProxy::apply_entry_headers(&mut header, mtime, &origin).unwrap();

        assert_eq!(
            header.headers.get("Last-Modified").unwrap().to_str().unwrap(),
            "Mon, 01 Jan 2024 00:00:00 GMT"
        );
        assert_eq!(header.headers.get("ETag").unwrap().to_str().unwrap(), "\"abc\"");
        assert_eq!(
            header.headers.get("Content-Type").unwrap().to_str().unwrap(),
            "image/png"
        );
        assert_eq!(
            header.headers.get("Cache-Control").unwrap().to_str().unwrap(),
            CACHE_CONTROL_POLICY
        );
    }
}
