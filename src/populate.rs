//! Background cache population.
//!
//! Stale verdicts redirect the client and enqueue the path here. A single
//! worker drains the queue, downloads each resource from the origin, and
//! installs it in the store stamped with the origin's `Last-Modified`.
//! Failures are logged and dropped; the next Stale request enqueues again.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::origin::Origin;
use crate::store::CacheStore;

pub struct Populator {
    origin: Arc<dyn Origin>,
    store: Arc<CacheStore>,
    // Worker is spawned lazily on first enqueue, once a runtime exists
    tx: OnceLock<mpsc::UnboundedSender<String>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Populator {
    pub fn new(origin: Arc<dyn Origin>, store: Arc<CacheStore>) -> Self {
        Self {
            origin,
            store,
            tx: OnceLock::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queue a path for population. A path already queued or mid-download
    /// is not queued again.
    pub fn enqueue(&self, path: &str) {
        if !self.in_flight.lock().insert(path.to_string()) {
            debug!(path = %path, "population already in flight, skipping");
            return;
        }

        let tx = self.tx.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let origin = Arc::clone(&self.origin);
            let store = Arc::clone(&self.store);
            let in_flight = Arc::clone(&self.in_flight);
            tokio::spawn(run_worker(origin, store, in_flight, rx));
            tx
        });

        if tx.send(path.to_string()).is_err() {
            // Worker is gone; nothing left to do but release the slot
            self.in_flight.lock().remove(path);
            warn!(path = %path, "population worker unavailable");
        }
    }
}

async fn run_worker(
    origin: Arc<dyn Origin>,
    store: Arc<CacheStore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(path) = rx.recv().await {
        populate_one(origin.as_ref(), &store, &path).await;
        in_flight.lock().remove(&path);
    }
}

/// Download one resource and install it. Errors are logged, never
/// propagated; the client already got its redirect.
async fn populate_one(origin: &dyn Origin, store: &CacheStore, path: &str) {
    let resource = match origin.download(path).await {
        Ok(resource) => resource,
        Err(e) => {
            warn!(path = %path, error = %e, "cache population download failed");
            return;
        }
    };

    let Some(last_modified) = resource.metadata.last_modified else {
        debug!(path = %path, "origin sent no Last-Modified, not caching");
        return;
    };

    match store
        .insert(path, &resource.body, last_modified.into())
        .await
    {
        Ok(()) => {
            info!(path = %path, bytes = resource.body.len(), "cache entry populated");
        }
        Err(e) => {
            warn!(path = %path, error = %e, "cache entry write failed");
        }
    }
}
