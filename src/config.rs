//! Immutable configuration snapshot.
//!
//! [`Settings`] collects every tunable the core reads: cache bounds, the
//! outbound-concurrency limit, the coalescing window, the upstream call
//! deadline, the downstream token ceiling, and default image transform
//! parameters. Built once via the gateway builder and shared read-only by
//! reference; nothing in the core mutates it after construction.

use std::time::Duration;

use crate::image::OutputFormat;
use crate::{MuninnError, Result};

/// Default image transform parameters, applied when an
/// [`ImageOptions`](crate::ImageOptions) field is left unset.
#[derive(Debug, Clone)]
pub struct ImageDefaults {
    /// Bounding-box width in pixels.
    pub max_width: u32,
    /// Bounding-box height in pixels.
    pub max_height: u32,
    /// Encoder quality for lossy formats (1–100).
    pub quality: u8,
    /// Output encoding.
    pub format: OutputFormat,
}

impl Default for ImageDefaults {
    fn default() -> Self {
        Self {
            max_width: 768,
            max_height: 768,
            quality: 80,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Immutable snapshot of all core tunables.
///
/// Builder-style setters with sensible defaults:
///
/// ```rust
/// # use muninn::Settings;
/// # use std::time::Duration;
/// let settings = Settings::new()
///     .cache_max_entries(1_000)
///     .cache_ttl(Duration::from_secs(600))
///     .max_concurrency(8);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of cached responses. Default: 500.
    pub cache_max_entries: usize,
    /// Lifetime of a cached response. Default: 5 minutes.
    pub cache_ttl: Duration,
    /// Maximum concurrently active upstream calls. Default: 10.
    pub max_concurrency: usize,
    /// Coalescing window an in-flight owner waits before dispatching,
    /// letting near-simultaneous callers attach. Zero disables the window.
    /// Default: 50ms.
    pub batch_delay: Duration,
    /// Deadline for a single upstream call. Default: 30 seconds.
    pub api_timeout: Duration,
    /// Downstream consumption ceiling, in tokens, that callers compare
    /// [`ImageResult::estimated_tokens`](crate::ImageResult) against.
    /// Default: 20,000.
    pub max_output_tokens: usize,
    /// Default image transform parameters.
    pub image_defaults: ImageDefaults,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_max_entries: 500,
            cache_ttl: Duration::from_secs(300),
            max_concurrency: 10,
            batch_delay: Duration::from_millis(50),
            api_timeout: Duration::from_secs(30),
            max_output_tokens: 20_000,
            image_defaults: ImageDefaults::default(),
        }
    }
}

impl Settings {
    /// Create a snapshot with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached responses.
    pub fn cache_max_entries(mut self, n: usize) -> Self {
        self.cache_max_entries = n;
        self
    }

    /// Set the lifetime of cached responses.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the maximum number of concurrently active upstream calls.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Set the coalescing window applied before dispatching a miss.
    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Set the per-call upstream deadline.
    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    /// Set the downstream token ceiling.
    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.max_output_tokens = n;
        self
    }

    /// Set the default image transform parameters.
    pub fn image_defaults(mut self, defaults: ImageDefaults) -> Self {
        self.image_defaults = defaults;
        self
    }

    /// Reject snapshots that cannot be operated on.
    ///
    /// Checked once at gateway construction; the snapshot is immutable
    /// afterwards, so the core never re-validates.
    pub fn validate(&self) -> Result<()> {
        if self.cache_max_entries == 0 {
            return Err(MuninnError::Configuration(
                "cache_max_entries must be at least 1".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(MuninnError::Configuration(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.api_timeout.is_zero() {
            return Err(MuninnError::Configuration(
                "api_timeout must be non-zero".into(),
            ));
        }
        if self.cache_ttl.is_zero() {
            return Err(MuninnError::Configuration(
                "cache_ttl must be non-zero".into(),
            ));
        }
        let img = &self.image_defaults;
        if img.max_width == 0 || img.max_height == 0 {
            return Err(MuninnError::Configuration(
                "image bounding box must be at least 1x1".into(),
            ));
        }
        if img.quality == 0 || img.quality > 100 {
            return Err(MuninnError::Configuration(format!(
                "image quality must be in 1..=100, got {}",
                img.quality
            )));
        }
        Ok(())
    }
}
