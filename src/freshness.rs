//! Freshness resolution.
//!
//! Pure classification of a request given the origin probe outcome and the
//! local entry's modification time. Computed per request, never persisted.
//! Side effects (serving, redirecting, deleting, repopulating) belong to
//! the proxy and populator.

use std::time::SystemTime;

use crate::origin::{OriginError, OriginMetadata};
use crate::store::StoreError;

/// Per-request classification of a cacheable resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Local entry is at least as new as the origin: serve it.
    Fresh {
        local_modified: SystemTime,
        origin: OriginMetadata,
    },
    /// Origin is newer or the entry is missing: redirect and repopulate.
    Stale { origin: OriginMetadata },
    /// Origin exists but carries no `Last-Modified`, so the entry can
    /// never be validated: redirect without repopulating.
    StaleNoValidator,
    /// Origin no longer has the resource: drop the entry, fall through.
    Gone,
}

/// Classify one request.
///
/// Any probe failure is Gone, whether the origin rejected the resource or
/// the probe never completed. Local stat errors other than NotFound are
/// the caller's to log; by the time resolution happens they have been
/// collapsed to NotFound so a flaky disk degrades to a redirect rather
/// than an error response.
pub fn resolve(
    probe: Result<OriginMetadata, OriginError>,
    local: Result<SystemTime, StoreError>,
) -> Verdict {
    let origin = match probe {
        Ok(metadata) => metadata,
        Err(_) => return Verdict::Gone,
    };

    let Some(origin_modified) = origin.last_modified else {
        return Verdict::StaleNoValidator;
    };

    match local {
        Ok(local_modified) if SystemTime::from(origin_modified) <= local_modified => {
            Verdict::Fresh {
                local_modified,
                origin,
            }
        }
        _ => Verdict::Stale { origin },
    }
}

/// Requests for the root or any directory-shaped path skip the cache
/// entirely and go straight to the next stage.
pub fn is_bypass_path(path: &str) -> bool {
    path == "/" || path.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::time::{Duration, UNIX_EPOCH};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn origin_at(secs: u64) -> OriginMetadata {
        OriginMetadata {
            last_modified: Some(DateTime::<Utc>::from(at(secs))),
            etag: Some("\"abc\"".to_string()),
            content_type: Some("text/plain".to_string()),
        }
    }

    #[test]
    fn test_local_newer_than_origin_is_fresh() {
        let verdict = resolve(Ok(origin_at(100)), Ok(at(200)));
        assert!(matches!(verdict, Verdict::Fresh { .. }));
    }

    #[test]
    fn test_equal_timestamps_are_fresh() {
        let verdict = resolve(Ok(origin_at(100)), Ok(at(100)));
        assert!(matches!(verdict, Verdict::Fresh { .. }));
    }

    #[test]
    fn test_origin_newer_than_local_is_stale() {
        let verdict = resolve(Ok(origin_at(200)), Ok(at(100)));
        assert!(matches!(verdict, Verdict::Stale { .. }));
    }

    #[test]
    fn test_missing_local_entry_is_stale() {
        let verdict = resolve(Ok(origin_at(100)), Err(StoreError::NotFound));
        assert!(matches!(verdict, Verdict::Stale { .. }));
    }

    #[test]
    fn test_origin_without_last_modified_is_stale_no_validator() {
        let origin = OriginMetadata::default();
        // Even a present local entry cannot be validated
        let verdict = resolve(Ok(origin), Ok(at(100)));
        assert_eq!(verdict, Verdict::StaleNoValidator);
    }

    #[test]
    fn test_probe_status_failure_is_gone() {
        let verdict = resolve(Err(OriginError::Status(404)), Ok(at(100)));
        assert_eq!(verdict, Verdict::Gone);
    }

    #[test]
    fn test_probe_failure_with_no_local_entry_is_still_gone() {
        let verdict = resolve(Err(OriginError::Status(500)), Err(StoreError::NotFound));
        assert_eq!(verdict, Verdict::Gone);
    }

    #[test]
    fn test_fresh_carries_local_mtime_and_origin_metadata() {
        match resolve(Ok(origin_at(100)), Ok(at(150))) {
            Verdict::Fresh {
                local_modified,
                origin,
            } => {
                assert_eq!(local_modified, at(150));
                assert_eq!(origin.etag.as_deref(), Some("\"abc\""));
            }
            other => panic!("expected Fresh, got {:?}", other),
        }
    }

    #[test]
    fn test_bypass_paths() {
        assert!(is_bypass_path("/"));
        assert!(is_bypass_path("/assets/"));
        assert!(!is_bypass_path("/assets/logo.png"));
        assert!(!is_bypass_path("/index.html"));
    }
}
