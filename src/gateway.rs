//! Gateway construction and the resource-access facade.
//!
//! [`Muninn::builder()`] configures and validates a [`ResourceGateway`]:
//! one owned instance holding the coordinator and the image optimizer over
//! a shared [`Fetcher`] and [`Settings`] snapshot. Resource handlers hold
//! a reference to the gateway and call [`get`](ResourceGateway::get) and
//! [`process_image`](ResourceGateway::process_image); there is no ambient
//! global instance.

use std::sync::Arc;

use serde_json::Value;

use crate::config::Settings;
use crate::coordinator::RequestCoordinator;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::image::{ImageOptimizer, ImageOptions, ImageResult};
use crate::{MuninnError, Result};

/// Main entry point for creating gateway instances.
pub struct Muninn;

impl Muninn {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> MuninnBuilder {
        MuninnBuilder::new()
    }
}

/// Builder for configuring gateway instances.
pub struct MuninnBuilder {
    settings: Settings,
    base_url: Option<String>,
    api_key: Option<String>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl MuninnBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            base_url: None,
            api_key: None,
            fetcher: None,
        }
    }

    /// Set the upstream API base URL (no trailing slash).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the upstream API key, sent as a bearer token.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Replace the default settings snapshot.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Inject a custom [`Fetcher`], bypassing the HTTP client. Used by
    /// tests and by embedders with their own transport.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Validate the configuration and build the gateway.
    pub fn build(self) -> Result<ResourceGateway> {
        self.settings.validate()?;
        let settings = Arc::new(self.settings);

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let base_url = self.base_url.ok_or_else(|| {
                    MuninnError::Configuration(
                        "a base URL is required unless a fetcher is injected".into(),
                    )
                })?;
                Arc::new(HttpFetcher::new(base_url, self.api_key))
            }
        };

        Ok(ResourceGateway {
            coordinator: RequestCoordinator::new(fetcher.clone(), settings.clone()),
            optimizer: ImageOptimizer::new(fetcher, settings.clone()),
            settings,
        })
    }
}

impl Default for MuninnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The resource-access layer: cache-aside JSON retrieval plus image
/// optimization over one upstream API.
pub struct ResourceGateway {
    coordinator: RequestCoordinator,
    optimizer: ImageOptimizer,
    settings: Arc<Settings>,
}

impl ResourceGateway {
    /// Resolve an upstream JSON resource, from cache when fresh.
    ///
    /// Concurrent calls for the same path and query coalesce onto a single
    /// upstream request; failures are returned to every caller and never
    /// cached.
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        self.coordinator.fetch_or_compute(path, query).await
    }

    /// Fetch and re-encode a remote image to fit a bounding box.
    ///
    /// Single-pass: compare [`ImageResult::estimated_tokens`] against
    /// [`Settings::max_output_tokens`] and re-invoke at a lower quality if
    /// the result is over budget.
    pub async fn process_image(&self, url: &str, options: &ImageOptions) -> Result<ImageResult> {
        self.optimizer.process(url, options).await
    }

    /// Drop the cached entry for a request signature, if present.
    pub fn invalidate(&self, path: &str, query: &[(String, String)]) -> bool {
        self.coordinator.invalidate(path, query)
    }

    /// Eagerly reclaim expired cache entries.
    pub fn purge_expired(&self) -> usize {
        self.coordinator.purge_expired()
    }

    /// Number of entries currently cached.
    pub fn cached_entries(&self) -> usize {
        self.coordinator.cached_entries()
    }

    /// The immutable configuration snapshot this gateway was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl std::fmt::Debug for ResourceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGateway")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
