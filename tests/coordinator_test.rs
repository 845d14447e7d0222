//! Tests for [`RequestCoordinator`] — cache-aside orchestration with
//! single-flight deduplication, bounded outbound concurrency, and typed
//! failure fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use muninn::{Fetcher, MuninnError, RequestCoordinator, Settings};
use serde_json::{json, Value};

/// Fetcher that counts invocations and answers with the requested path
/// after a fixed delay.
struct CountingFetcher {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingFetcher {
    fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch_json(
        &self,
        path: &str,
        _query: &[(String, String)],
        _timeout: Duration,
    ) -> muninn::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "path": path }))
    }

    async fn fetch_bytes(&self, _url: &str, _timeout: Duration) -> muninn::Result<Vec<u8>> {
        Err(MuninnError::Http("bytes not supported by this mock".into()))
    }
}

/// Fetcher that tracks how many calls are active at once.
struct ConcurrencyFetcher {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyFetcher {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Fetcher for ConcurrencyFetcher {
    async fn fetch_json(
        &self,
        path: &str,
        _query: &[(String, String)],
        _timeout: Duration,
    ) -> muninn::Result<Value> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "path": path }))
    }

    async fn fetch_bytes(&self, _url: &str, _timeout: Duration) -> muninn::Result<Vec<u8>> {
        Err(MuninnError::Http("bytes not supported by this mock".into()))
    }
}

/// Fetcher that fails a fixed number of times before succeeding.
struct FlakyFetcher {
    calls: AtomicUsize,
    failures: usize,
}

#[async_trait]
impl Fetcher for FlakyFetcher {
    async fn fetch_json(
        &self,
        path: &str,
        _query: &[(String, String)],
        _timeout: Duration,
    ) -> muninn::Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(MuninnError::Upstream {
                status: 502,
                message: "bad gateway".into(),
            })
        } else {
            Ok(json!({ "path": path }))
        }
    }

    async fn fetch_bytes(&self, _url: &str, _timeout: Duration) -> muninn::Result<Vec<u8>> {
        Err(MuninnError::Http("bytes not supported by this mock".into()))
    }
}

/// Fetcher that never answers within any reasonable deadline.
struct StalledFetcher;

#[async_trait]
impl Fetcher for StalledFetcher {
    async fn fetch_json(
        &self,
        path: &str,
        _query: &[(String, String)],
        _timeout: Duration,
    ) -> muninn::Result<Value> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!({ "path": path }))
    }

    async fn fetch_bytes(&self, _url: &str, _timeout: Duration) -> muninn::Result<Vec<u8>> {
        Err(MuninnError::Http("bytes not supported by this mock".into()))
    }
}

fn test_settings() -> Settings {
    Settings::new()
        .batch_delay(Duration::from_millis(20))
        .api_timeout(Duration::from_secs(2))
}

fn coordinator(fetcher: Arc<dyn Fetcher>, settings: Settings) -> Arc<RequestCoordinator> {
    Arc::new(RequestCoordinator::new(fetcher, Arc::new(settings)))
}

// =========================================================================
// Cache-aside basics
// =========================================================================

#[tokio::test]
async fn second_call_is_served_from_cache() {
    let fetcher = Arc::new(CountingFetcher::new(Duration::ZERO));
    let coord = coordinator(fetcher.clone(), test_settings());

    let first = coord.fetch_or_compute("/movie/1", &[]).await.unwrap();
    let second = coord.fetch_or_compute("/movie/1", &[]).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn query_order_does_not_split_the_cache() {
    let fetcher = Arc::new(CountingFetcher::new(Duration::ZERO));
    let coord = coordinator(fetcher.clone(), test_settings());

    let q1 = vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())];
    let q2 = vec![("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())];

    coord.fetch_or_compute("/search", &q1).await.unwrap();
    coord.fetch_or_compute("/search", &q2).await.unwrap();

    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn distinct_keys_each_go_upstream() {
    let fetcher = Arc::new(CountingFetcher::new(Duration::ZERO));
    let coord = coordinator(fetcher.clone(), test_settings());

    let a = coord.fetch_or_compute("/movie/1", &[]).await.unwrap();
    let b = coord.fetch_or_compute("/movie/2", &[]).await.unwrap();

    assert_ne!(a, b);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn expired_entry_triggers_recompute() {
    let fetcher = Arc::new(CountingFetcher::new(Duration::ZERO));
    let settings = test_settings().cache_ttl(Duration::from_millis(100));
    let coord = coordinator(fetcher.clone(), settings);

    coord.fetch_or_compute("/movie/1", &[]).await.unwrap();
    assert_eq!(fetcher.calls(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    coord.fetch_or_compute("/movie/1", &[]).await.unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn invalidate_forces_a_refetch() {
    let fetcher = Arc::new(CountingFetcher::new(Duration::ZERO));
    let coord = coordinator(fetcher.clone(), test_settings());

    coord.fetch_or_compute("/movie/1", &[]).await.unwrap();
    assert!(coord.invalidate("/movie/1", &[]));

    coord.fetch_or_compute("/movie/1", &[]).await.unwrap();
    assert_eq!(fetcher.calls(), 2);
}

// =========================================================================
// Single-flight deduplication
// =========================================================================

#[tokio::test]
async fn concurrent_identical_requests_share_one_upstream_call() {
    let fetcher = Arc::new(CountingFetcher::new(Duration::from_millis(50)));
    let coord = coordinator(fetcher.clone(), test_settings());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let coord = coord.clone();
        handles.push(tokio::spawn(async move {
            coord.fetch_or_compute("/movie/42", &[]).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(fetcher.calls(), 1);
    assert!(outcomes.iter().all(|v| *v == outcomes[0]));
}

#[tokio::test]
async fn concurrent_distinct_keys_do_not_coalesce() {
    let fetcher = Arc::new(CountingFetcher::new(Duration::from_millis(30)));
    let coord = coordinator(fetcher.clone(), test_settings());

    let mut handles = Vec::new();
    for i in 0..4 {
        let coord = coord.clone();
        handles.push(tokio::spawn(async move {
            coord.fetch_or_compute(&format!("/movie/{i}"), &[]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(fetcher.calls(), 4);
}

// =========================================================================
// Bounded outbound concurrency
// =========================================================================

#[tokio::test]
async fn active_upstream_calls_never_exceed_the_limit() {
    let fetcher = Arc::new(ConcurrencyFetcher::new());
    let settings = test_settings().max_concurrency(2).batch_delay(Duration::ZERO);
    let coord = coordinator(fetcher.clone(), settings);

    let mut handles = Vec::new();
    for i in 0..8 {
        let coord = coord.clone();
        handles.push(tokio::spawn(async move {
            coord.fetch_or_compute(&format!("/item/{i}"), &[]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(
        fetcher.peak.load(Ordering::SeqCst) <= 2,
        "peak concurrency {} exceeded limit 2",
        fetcher.peak.load(Ordering::SeqCst)
    );
}

// =========================================================================
// Failure propagation
// =========================================================================

#[tokio::test]
async fn failures_are_returned_and_never_cached() {
    let fetcher = Arc::new(FlakyFetcher {
        calls: AtomicUsize::new(0),
        failures: 1,
    });
    let coord = coordinator(fetcher.clone(), test_settings());

    let err = coord.fetch_or_compute("/movie/1", &[]).await.unwrap_err();
    assert!(matches!(err, MuninnError::Upstream { status: 502, .. }));
    assert_eq!(coord.cached_entries(), 0);

    // The failure was not cached, so the next call goes upstream and succeeds.
    let value = coord.fetch_or_compute("/movie/1", &[]).await.unwrap();
    assert_eq!(value, json!({ "path": "/movie/1" }));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn waiters_receive_the_owner_failure_verbatim() {
    let fetcher = Arc::new(FlakyFetcher {
        calls: AtomicUsize::new(0),
        failures: usize::MAX,
    });
    // A wide coalescing window so all three callers attach to one flight.
    let settings = test_settings().batch_delay(Duration::from_millis(100));
    let coord = coordinator(fetcher.clone(), settings);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let coord = coord.clone();
        handles.push(tokio::spawn(async move {
            coord.fetch_or_compute("/movie/1", &[]).await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MuninnError::Upstream { status: 502, .. }));
    }
    // One flight, one upstream attempt, three failed callers.
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timeout_reaches_every_waiter_and_nothing_is_cached() {
    let fetcher = Arc::new(StalledFetcher);
    let settings = test_settings().api_timeout(Duration::from_millis(80));
    let coord = coordinator(fetcher, settings);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let coord = coord.clone();
        handles.push(tokio::spawn(async move {
            coord.fetch_or_compute("/slow", &[]).await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MuninnError::Timeout(_)));
    }
    assert_eq!(coord.cached_entries(), 0);
}
