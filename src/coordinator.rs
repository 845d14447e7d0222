//! Cache-aside request coordination with single-flight deduplication.
//!
//! [`RequestCoordinator`] owns the response cache and the in-flight map.
//! On a miss, the first caller for a key becomes the flight's *owner*:
//! it waits out a short coalescing window, takes one of the bounded
//! outbound slots, and performs the upstream call. Every other caller for
//! the same key that arrives before resolution attaches as a *waiter* on
//! the flight's watch channel and receives the identical outcome — value
//! or error — without a second upstream call. Failures are never cached.
//!
//! The cache check, in-flight check, and owner registration execute under
//! one lock, so two callers can never both own a flight for the same key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::config::Settings;
use crate::fetcher::Fetcher;
use crate::telemetry;
use crate::{MuninnError, Result};

type Outcome = Result<Value>;

enum Role {
    Owner(watch::Sender<Option<Outcome>>),
    Waiter(watch::Receiver<Option<Outcome>>),
}

/// Removes the in-flight entry when the owner resolves — or unwinds
/// without resolving, so an abandoned flight never wedges its key.
struct FlightGuard<'a> {
    key: &'a str,
    inflight: &'a Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.lock().unwrap().remove(self.key);
    }
}

/// Cache-aside orchestrator over a [`Fetcher`].
pub struct RequestCoordinator {
    fetcher: Arc<dyn Fetcher>,
    settings: Arc<Settings>,
    cache: CacheStore,
    inflight: Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>,
    outbound_slots: Arc<Semaphore>,
}

impl RequestCoordinator {
    /// Create a coordinator with an empty cache and all outbound slots free.
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: Arc<Settings>) -> Self {
        let cache = CacheStore::new(settings.cache_max_entries);
        // Tokio semaphores are fair: blocked acquirers are served FIFO.
        let outbound_slots = Arc::new(Semaphore::new(settings.max_concurrency));
        Self {
            fetcher,
            settings,
            cache,
            inflight: Mutex::new(HashMap::new()),
            outbound_slots,
        }
    }

    /// Resolve `path` + `query` to a JSON value, from cache when fresh,
    /// upstream otherwise.
    pub async fn fetch_or_compute(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let key = canonical_key(path, query);
        let outcome = self.resolve(&key, path, query).await;

        let status = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL, "operation" => "get", "status" => status)
            .increment(1);
        outcome
    }

    /// Drop the cached entry for `path` + `query`. Returns whether an
    /// entry was present.
    pub fn invalidate(&self, path: &str, query: &[(String, String)]) -> bool {
        self.cache.invalidate(&canonical_key(path, query))
    }

    /// Eagerly reclaim expired cache entries, returning how many were
    /// removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Number of entries currently cached.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    async fn resolve(&self, key: &str, path: &str, query: &[(String, String)]) -> Outcome {
        // Cache check, in-flight check, and owner registration are one
        // atomic unit per key. The cache's own lock nests inside; it never
        // takes the in-flight lock.
        let role = {
            let mut inflight = self.inflight.lock().unwrap();
            if let Some(value) = self.cache.get(key) {
                return Ok(value);
            }
            match inflight.get(key) {
                Some(rx) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.to_string(), rx);
                    Role::Owner(tx)
                }
            }
        };

        match role {
            Role::Waiter(mut rx) => {
                metrics::counter!(telemetry::COALESCED_WAITS_TOTAL).increment(1);
                debug!(key, "attached to in-flight request");
                match rx.wait_for(Option::is_some).await {
                    Ok(resolved) => resolved.clone().unwrap_or_else(|| {
                        Err(MuninnError::Http("in-flight request resolved empty".into()))
                    }),
                    // Sender dropped without resolving: the owner was
                    // cancelled mid-flight.
                    Err(_) => Err(MuninnError::Http(
                        "in-flight request abandoned before resolving".into(),
                    )),
                }
            }
            Role::Owner(tx) => {
                let guard = FlightGuard {
                    key,
                    inflight: &self.inflight,
                };

                let outcome = self.call_upstream(key, path, query).await;
                if let Ok(ref value) = outcome {
                    self.cache.put(key, value.clone(), self.settings.cache_ttl);
                }

                // Deregister before broadcasting: a caller arriving after a
                // failure must start a fresh flight, not observe the dead one.
                drop(guard);
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
        }
    }

    async fn call_upstream(&self, key: &str, path: &str, query: &[(String, String)]) -> Outcome {
        // Coalescing window: let near-simultaneous callers attach to this
        // flight before the slot is taken.
        if !self.settings.batch_delay.is_zero() {
            tokio::time::sleep(self.settings.batch_delay).await;
        }

        let _permit = self
            .outbound_slots
            .acquire()
            .await
            .map_err(|_| MuninnError::Http("outbound slot pool closed".into()))?;

        metrics::counter!(telemetry::UPSTREAM_CALLS_TOTAL).increment(1);
        let started = Instant::now();

        let deadline = self.settings.api_timeout;
        let outcome = match tokio::time::timeout(
            deadline,
            self.fetcher.fetch_json(path, query, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MuninnError::Timeout(deadline)),
        };

        metrics::histogram!(telemetry::UPSTREAM_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        if let Err(ref e) = outcome {
            warn!(key, error = %e, "upstream call failed");
        }
        outcome
    }
}

/// Canonical request signature: path plus query pairs sorted by name then
/// value, so argument order never splits the cache.
fn canonical_key(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let mut pairs = query.to_vec();
    pairs.sort();
    let encoded: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", path, encoded.join("&"))
}
