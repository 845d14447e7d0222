//! Outbound retrieval boundary.
//!
//! [`Fetcher`] is the seam between the core and the network: a single
//! deadline-bounded retrieval returning bytes or JSON, with failures mapped
//! to typed [`MuninnError`](crate::MuninnError) variants. The coordinator
//! and optimizer both talk to it; tests substitute their own
//! implementations to count or delay calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{MuninnError, Result};

/// A single outbound retrieval with a deadline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a JSON document from `path` (relative to the upstream base)
    /// with the given query parameters.
    async fn fetch_json(
        &self,
        path: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value>;

    /// Fetch raw bytes from an absolute `url` (e.g. an image host that is
    /// not the JSON API).
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// Reqwest-backed [`Fetcher`] for an upstream HTTP API.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpFetcher {
    /// Create a fetcher for the given upstream base URL (no trailing slash),
    /// optionally sending `Authorization: Bearer <key>` on JSON requests.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Map a transport-level reqwest failure, preserving the deadline that
    /// actually applied (the generic `From` impl cannot know it).
    fn transport_error(err: reqwest::Error, timeout: Duration) -> MuninnError {
        if err.is_timeout() {
            MuninnError::Timeout(timeout)
        } else {
            MuninnError::Http(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_json(
        &self,
        path: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.get(&url).query(query).timeout(timeout);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::transport_error(e, timeout))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MuninnError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MuninnError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| MuninnError::Json(e.to_string()))
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(e, timeout))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MuninnError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(MuninnError::Upstream {
                status: status.as_u16(),
                message: format!("fetching {}", url),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(e, timeout))?;
        Ok(bytes.to_vec())
    }
}
