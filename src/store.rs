//! Local cache tree.
//!
//! One file per resource, laid out under a single root directory mirroring
//! the request path. The file's modification time is the freshness
//! validator: the populator stamps it to the origin's `Last-Modified`,
//! and the resolver compares it against the origin's current value.
//!
//! Writes go through a temp file in the destination directory followed by
//! a rename, so readers never observe a partially written entry.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The entry does not exist. Expected on every first request for a
    /// resource, so callers treat it as a verdict input, not a failure.
    #[error("cache entry not found")]
    NotFound,

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_io(e: std::io::Error) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::NotFound
    } else {
        StoreError::Io(e)
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a request path to its location under the cache root.
    ///
    /// The path must already be traversal-checked by the caller; this only
    /// strips the leading slash and splits on separators.
    pub fn local_path(&self, request_path: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in request_path.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    /// True when the request path contains a parent-directory component
    /// and must not be mapped into the cache tree.
    pub fn is_traversal(request_path: &str) -> bool {
        Path::new(request_path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    }

    /// Modification time of the cached entry.
    pub async fn modified(&self, request_path: &str) -> Result<SystemTime, StoreError> {
        let path = self.local_path(request_path);
        let metadata = tokio::fs::metadata(&path).await.map_err(map_io)?;
        metadata.modified().map_err(StoreError::Io)
    }

    /// Open the cached entry for streaming, returning the file and its length.
    pub async fn open(&self, request_path: &str) -> Result<(tokio::fs::File, u64), StoreError> {
        let path = self.local_path(request_path);
        let file = tokio::fs::File::open(&path).await.map_err(map_io)?;
        let len = file.metadata().await.map_err(StoreError::Io)?.len();
        Ok((file, len))
    }

    /// Write an entry and stamp its modification time.
    ///
    /// The body lands in a uniquely named temp file next to the destination,
    /// gets its mtime set, and is renamed into place. A concurrent reader
    /// sees either the old entry or the new one, never a torn write.
    pub async fn insert(
        &self,
        request_path: &str,
        body: &[u8],
        modified: SystemTime,
    ) -> Result<(), StoreError> {
        let path = self.local_path(request_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Suffix the whole file name so multi-dot names stay adjacent
        // to the target (a.tar.gz -> a.tar.gz.tmp-<uuid>)
        let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        temp_name.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        let temp_path = path.with_file_name(temp_name);

        let result = self.write_entry(&temp_path, body, modified, &path).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        result
    }

    async fn write_entry(
        &self,
        temp_path: &Path,
        body: &[u8],
        modified: SystemTime,
        final_path: &Path,
    ) -> Result<(), StoreError> {
        tokio::fs::write(temp_path, body).await?;

        // set_modified is blocking-only; run it off the async threads
        let stamp_path = temp_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::options().write(true).open(&stamp_path)?;
            file.set_modified(modified)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        tokio::fs::rename(temp_path, final_path).await?;
        Ok(())
    }

    /// Delete the cached entry. Returns `Ok(false)` when it did not exist.
    pub async fn remove(&self, request_path: &str) -> Result<bool, StoreError> {
        let path = self.local_path(request_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
