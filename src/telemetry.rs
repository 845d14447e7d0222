//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`, `_bytes`).
//!
//! # Common labels
//!
//! - `operation` — gateway surface invoked ("get" | "process_image")
//! - `status` — outcome: "ok" or "error"
//! - `format` — image output format ("jpeg" | "png" | "webp")

/// Total requests served through the coordinator.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// Total outbound upstream calls actually dispatched.
///
/// One per miss-to-resolution cycle; coalesced waiters do not count.
pub const UPSTREAM_CALLS_TOTAL: &str = "muninn_upstream_calls_total";

/// Upstream call duration in seconds.
pub const UPSTREAM_DURATION_SECONDS: &str = "muninn_upstream_duration_seconds";

/// Total callers that attached to an already in-flight request.
pub const COALESCED_WAITS_TOTAL: &str = "muninn_coalesced_waits_total";

/// Total cache hits.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total cache misses (absent or expired entries).
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total cache entries evicted to make room at capacity.
pub const CACHE_EVICTIONS_TOTAL: &str = "muninn_cache_evictions_total";

/// Total images processed.
///
/// Labels: `format`.
pub const IMAGES_PROCESSED_TOTAL: &str = "muninn_images_processed_total";

/// Re-encoded image output size in bytes.
///
/// Labels: `format`.
pub const IMAGE_OUTPUT_BYTES: &str = "muninn_image_output_bytes";
