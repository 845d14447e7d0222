//! Tests for [`CacheStore`] — bounded LRU + TTL store for opaque payloads.

use std::time::Duration;

use muninn::CacheStore;
use serde_json::json;

const TTL: Duration = Duration::from_secs(60);

// =========================================================================
// Freshness and TTL
// =========================================================================

#[test]
fn put_then_get_returns_value() {
    let store = CacheStore::new(10);
    store.put("A", json!({"n": 1}), TTL);
    assert_eq!(store.get("A"), Some(json!({"n": 1})));
}

#[tokio::test]
async fn entry_expires_after_ttl() {
    let store = CacheStore::new(10);
    store.put("A", json!({"n": 1}), Duration::from_millis(100));

    // Fresh at t=0
    assert_eq!(store.get("A"), Some(json!({"n": 1})));

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Stale at t=150ms: treated as absent
    assert_eq!(store.get("A"), None);
}

#[tokio::test]
async fn overwrite_restarts_the_clock() {
    let store = CacheStore::new(10);
    store.put("A", json!(1), Duration::from_millis(80));

    tokio::time::sleep(Duration::from_millis(50)).await;
    store.put("A", json!(2), Duration::from_millis(80));

    // The original entry would be stale by now; the overwrite is not.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.get("A"), Some(json!(2)));
}

#[tokio::test]
async fn purge_expired_counts_removals() {
    let store = CacheStore::new(10);
    store.put("short", json!(1), Duration::from_millis(30));
    store.put("long", json!(2), TTL);

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(store.purge_expired(), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("long"), Some(json!(2)));
}

// =========================================================================
// Capacity and eviction order
// =========================================================================

#[test]
fn capacity_two_keeps_the_two_newest() {
    let store = CacheStore::new(2);
    store.put("A", json!("a"), TTL);
    store.put("B", json!("b"), TTL);
    store.put("C", json!("c"), TTL);

    assert_eq!(store.get("A"), None);
    assert_eq!(store.get("B"), Some(json!("b")));
    assert_eq!(store.get("C"), Some(json!("c")));
}

#[test]
fn recently_read_entry_survives_eviction() {
    let store = CacheStore::new(2);
    store.put("A", json!("a"), TTL);
    store.put("B", json!("b"), TTL);

    // Touch A so B becomes least-recently-used.
    assert!(store.get("A").is_some());
    store.put("C", json!("c"), TTL);

    assert_eq!(store.get("A"), Some(json!("a")));
    assert_eq!(store.get("B"), None);
    assert_eq!(store.get("C"), Some(json!("c")));
}

#[test]
fn store_never_exceeds_capacity() {
    let store = CacheStore::new(3);
    for i in 0..20 {
        store.put(&format!("key-{i}"), json!(i), TTL);
        assert!(store.len() <= 3);
    }
}

// =========================================================================
// Explicit removal
// =========================================================================

#[test]
fn invalidate_removes_a_single_entry() {
    let store = CacheStore::new(10);
    store.put("A", json!(1), TTL);
    store.put("B", json!(2), TTL);

    assert!(store.invalidate("A"));
    assert_eq!(store.get("A"), None);
    assert_eq!(store.get("B"), Some(json!(2)));
    assert!(!store.invalidate("A"));
}

#[test]
fn clear_empties_the_store() {
    let store = CacheStore::new(10);
    store.put("A", json!(1), TTL);
    store.put("B", json!(2), TTL);

    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.get("A"), None);
}
