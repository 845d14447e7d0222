//! Image fetching and re-encoding for a size-bounded consumer.
//!
//! [`ImageOptimizer`] pulls a remote image through the [`Fetcher`], decodes
//! it, scales it down to fit a bounding box (aspect-preserving, never
//! upscaling), and re-encodes it at a requested format and quality. The
//! result reports the size, dimension, and token metrics the caller needs
//! to compare against a downstream ceiling.
//!
//! This is a single-pass operation. When a result still exceeds the
//! caller's budget, re-invoking at a lower quality or smaller box is the
//! caller's decision; no step-down loop runs here.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::{WebPEncoder, WebPQuality};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use serde::Deserialize;
use tracing::debug;

use crate::config::Settings;
use crate::fetcher::Fetcher;
use crate::telemetry;
use crate::{MuninnError, Result};

/// Base64 transport inflates payloads by 4/3, and downstream consumers
/// count roughly four characters per token, so each token covers about
/// three raw bytes.
const BYTES_PER_TOKEN: usize = 3;

/// Output encoding for processed images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    /// MIME type for the encoded bytes.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Lowercase name, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    /// Whether the encoder discards information (and so honors `quality`).
    pub fn is_lossy(&self) -> bool {
        !matches!(self, OutputFormat::Png)
    }
}

/// Per-call transform parameters. Unset fields fall back to the
/// [`ImageDefaults`](crate::ImageDefaults) in [`Settings`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageOptions {
    /// Bounding-box width in pixels.
    pub max_width: Option<u32>,
    /// Bounding-box height in pixels.
    pub max_height: Option<u32>,
    /// Encoder quality for lossy formats (1–100).
    pub quality: Option<u8>,
    /// Output encoding.
    pub format: Option<OutputFormat>,
}

impl ImageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding-box width.
    pub fn max_width(mut self, px: u32) -> Self {
        self.max_width = Some(px);
        self
    }

    /// Set the bounding-box height.
    pub fn max_height(mut self, px: u32) -> Self {
        self.max_height = Some(px);
        self
    }

    /// Set the encoder quality (lossy formats only).
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Set the output encoding.
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// A processed image and its size/compression metrics.
#[derive(Debug, Clone)]
pub struct ImageResult {
    /// Re-encoded image bytes.
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub mime_type: &'static str,
    /// Byte length of the source as fetched.
    pub original_size: usize,
    /// Byte length of `data`.
    pub processed_size: usize,
    /// Final pixel width.
    pub width: u32,
    /// Final pixel height.
    pub height: u32,
    /// Downstream consumption estimate for `data`; see [`estimated_tokens`].
    pub estimated_tokens: usize,
    /// `original_size / processed_size`. Below 1.0 when the source was
    /// already more compact than the re-encoding.
    pub compression_ratio: f64,
}

impl ImageResult {
    /// Whether this result fits under a token ceiling.
    pub fn within_budget(&self, max_tokens: usize) -> bool {
        self.estimated_tokens <= max_tokens
    }
}

/// Estimate downstream token consumption for a payload of `size` bytes.
///
/// A fixed divisor: `ceil(size / 3)`, covering base64 inflation at roughly
/// four characters per token. Monotone in `size` by construction.
pub fn estimated_tokens(size: usize) -> usize {
    size.div_ceil(BYTES_PER_TOKEN)
}

/// Fetches, decodes, resizes, and re-encodes remote images.
pub struct ImageOptimizer {
    fetcher: Arc<dyn Fetcher>,
    settings: Arc<Settings>,
}

impl ImageOptimizer {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: Arc<Settings>) -> Self {
        Self { fetcher, settings }
    }

    /// Fetch `url` and re-encode it to fit the requested bounding box.
    pub async fn process(&self, url: &str, options: &ImageOptions) -> Result<ImageResult> {
        let outcome = self.run(url, options).await;

        let status = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            telemetry::REQUESTS_TOTAL,
            "operation" => "process_image",
            "status" => status
        )
        .increment(1);
        outcome
    }

    async fn run(&self, url: &str, options: &ImageOptions) -> Result<ImageResult> {
        let defaults = &self.settings.image_defaults;
        let max_width = options.max_width.unwrap_or(defaults.max_width);
        let max_height = options.max_height.unwrap_or(defaults.max_height);
        let quality = options.quality.unwrap_or(defaults.quality);
        let format = options.format.unwrap_or(defaults.format);

        if max_width == 0 || max_height == 0 {
            return Err(MuninnError::Configuration(
                "image bounding box must be at least 1x1".into(),
            ));
        }
        if quality == 0 || quality > 100 {
            return Err(MuninnError::Configuration(format!(
                "image quality must be in 1..=100, got {}",
                quality
            )));
        }

        let deadline = self.settings.api_timeout;
        let raw = match tokio::time::timeout(deadline, self.fetcher.fetch_bytes(url, deadline))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(MuninnError::Timeout(deadline)),
        };
        let original_size = raw.len();

        let decoded =
            image::load_from_memory(&raw).map_err(|e| MuninnError::Decode(e.to_string()))?;
        let (source_width, source_height) = decoded.dimensions();

        let resized = match target_dimensions(source_width, source_height, max_width, max_height) {
            Some((w, h)) => decoded.resize_exact(w, h, FilterType::Lanczos3),
            None => decoded,
        };
        let (width, height) = resized.dimensions();

        let data = encode(&resized, format, quality)?;
        let processed_size = data.len();

        metrics::counter!(telemetry::IMAGES_PROCESSED_TOTAL, "format" => format.as_str())
            .increment(1);
        metrics::histogram!(telemetry::IMAGE_OUTPUT_BYTES, "format" => format.as_str())
            .record(processed_size as f64);
        debug!(
            url,
            original_size,
            processed_size,
            width,
            height,
            format = format.as_str(),
            "image re-encoded"
        );

        Ok(ImageResult {
            mime_type: format.mime_type(),
            original_size,
            processed_size,
            width,
            height,
            estimated_tokens: estimated_tokens(processed_size),
            compression_ratio: original_size as f64 / processed_size as f64,
            data,
        })
    }
}

/// Dimensions that fit `max_w` × `max_h` while preserving aspect ratio.
///
/// Returns `None` when the source already fits — sources are never
/// upscaled. Rounded dimensions are clamped to at least one pixel.
fn target_dimensions(w: u32, h: u32, max_w: u32, max_h: u32) -> Option<(u32, u32)> {
    let scale = f64::min(max_w as f64 / w as f64, max_h as f64 / h as f64);
    if scale >= 1.0 {
        return None;
    }
    let tw = ((w as f64 * scale).round() as u32).max(1);
    let th = ((h as f64 * scale).round() as u32).max(1);
    Some((tw.min(max_w), th.min(max_h)))
}

/// Encode at the requested format. `quality` applies to lossy encoders;
/// PNG ignores it.
fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel; flatten first.
            let rgb = img.to_rgb8();
            let mut cursor = Cursor::new(&mut out);
            let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| MuninnError::Decode(e.to_string()))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
                .map_err(|e| MuninnError::Decode(e.to_string()))?;
        }
        OutputFormat::WebP => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let mut cursor = Cursor::new(&mut out);
            let encoder = WebPEncoder::new_with_quality(
                &mut cursor,
                WebPQuality::lossy(quality),
            );
            encoder
                .encode(rgba.as_raw(), w, h, ColorType::Rgba8)
                .map_err(|e| MuninnError::Decode(e.to_string()))?;
        }
    }
    Ok(out)
}
