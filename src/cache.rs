//! Bounded response cache with TTL expiry and LRU eviction.
//!
//! [`CacheStore`] holds opaque JSON payloads keyed by canonical request
//! signature. Entries expire `ttl` after insertion and are purged on the
//! next touch; inserting at capacity evicts the least-recently-used entry
//! (by last read, falling back to insertion order for never-read entries).
//!
//! Eviction must be deterministic — callers rely on exact `put(A)`,
//! `put(B)`, `put(C)` → `{B, C}` behavior at capacity 2 — so the store is
//! hand-built on a recency sequence rather than an approximating cache
//! crate. All operations are pure data-structure mutations under a single
//! mutex; nothing awaits or performs I/O while holding it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::telemetry;

struct CacheEntry {
    value: Value,
    inserted: Instant,
    ttl: Duration,
    /// Recency marker: bumped from a shared counter on insert and on every
    /// fresh read. Strictly increasing, so the minimum is always the
    /// least-recently-used entry and ties cannot arise.
    touched_seq: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted.elapsed() >= self.ttl
    }
}

struct State {
    entries: HashMap<String, CacheEntry>,
    seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// Bounded, keyed store of opaque JSON payloads.
pub struct CacheStore {
    inner: Mutex<State>,
    max_entries: usize,
}

impl CacheStore {
    /// Create an empty store holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(State {
                entries: HashMap::new(),
                seq: 0,
            }),
            max_entries,
        }
    }

    /// Look up a fresh entry, bumping its recency.
    ///
    /// A stale entry is removed and reported as a miss. Emits cache
    /// hit/miss metrics.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.inner.lock().unwrap();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                return None;
            }
        };
        if expired {
            state.entries.remove(key);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            return None;
        }

        let seq = state.next_seq();
        let entry = state.entries.get_mut(key)?;
        entry.touched_seq = seq;
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        Some(entry.value.clone())
    }

    /// Insert or overwrite an entry.
    ///
    /// When the store is at capacity and `key` is new, the
    /// least-recently-used entry is evicted first.
    pub fn put(&self, key: &str, value: Value, ttl: Duration) {
        let mut state = self.inner.lock().unwrap();

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_entries {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.touched_seq)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                state.entries.remove(&victim);
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
                debug!(key = %victim, "evicted least-recently-used cache entry");
            }
        }

        let seq = state.next_seq();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted: Instant::now(),
                ttl,
                touched_seq: seq,
            },
        );
    }

    /// Remove a single entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().unwrap().entries.remove(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    ///
    /// Expired entries are already invisible to `get`; this reclaims their
    /// memory eagerly for long-idle stores.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.inner.lock().unwrap();
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.is_expired());
        before - state.entries.len()
    }

    /// Number of entries currently stored, including not-yet-purged
    /// expired ones.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.lock().unwrap().entries.clear();
    }
}
