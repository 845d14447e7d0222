//! Muninn - cached resource-access gateway for read-only upstream APIs
//!
//! This crate fronts a remote, read-only data API with two guarantees:
//! responses are cached with bounded memory and time-based expiry, with at
//! most one outbound call per distinct request in flight; and remote
//! images are re-encoded to fit a strict output-size ceiling imposed by a
//! downstream consumer.
//!
//! # Example
//!
//! ```rust,no_run
//! use muninn::{ImageOptions, Muninn, Settings};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let gateway = Muninn::builder()
//!         .base_url("https://api.example.com/3")
//!         .api_key("your-key")
//!         .settings(Settings::new().cache_max_entries(1_000))
//!         .build()?;
//!
//!     // Cache-aside JSON retrieval; concurrent identical requests
//!     // coalesce onto one upstream call.
//!     let detail = gateway
//!         .get("/movie/603", &[("language".into(), "en-US".into())])
//!         .await?;
//!     println!("{}", detail["title"]);
//!
//!     // Fetch and re-encode a poster to fit a 400x300 box.
//!     let poster = gateway
//!         .process_image(
//!             "https://images.example.com/poster/603.jpg",
//!             &ImageOptions::new().max_width(400).max_height(300),
//!         )
//!         .await?;
//!     assert!(poster.within_budget(gateway.settings().max_output_tokens));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod image;
pub mod telemetry;

// Re-export main types at crate root
pub use cache::CacheStore;
pub use config::{ImageDefaults, Settings};
pub use coordinator::RequestCoordinator;
pub use error::{MuninnError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use gateway::{Muninn, MuninnBuilder, ResourceGateway};
pub use image::{ImageOptimizer, ImageOptions, ImageResult, OutputFormat};
