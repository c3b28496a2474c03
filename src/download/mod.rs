//! Fetching, normalizing and saving images.
//!
//! This module provides the network and persistence half of the pipeline:
//! an HTTP client with a rotating browser identity, image normalization to
//! a single raster format, and a concurrent batch engine with pacing and
//! retry.
//!
//! # Features
//!
//! - Randomized User-Agent per request and a pre-flight connectivity probe
//! - Explicit timeouts (10s connect, 15s fetch, 5s probe by default)
//! - Transparency flattened onto white; SVG saved verbatim
//! - Batch-unique filenames derived from the URL path
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use image_downloader_core::download::{HttpClient, TargetFormat, normalize};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let url = "https://example.com/photo.webp";
//! let image = normalize(client.fetch(url).await?, url, TargetFormat::Png)?;
//! std::fs::write(format!("photo.{}", image.extension), image.bytes)?;
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod encoder;
mod engine;
mod error;
pub mod filename;
mod pacing;
mod retry;

pub use client::HttpClient;
pub use constants::{DEFAULT_PACING_MAX, DEFAULT_PACING_MIN, FETCH_TIMEOUT_SECS, PROBE_TIMEOUT_SECS};
pub use encoder::{NormalizedImage, TargetFormat, looks_like_svg, normalize};
pub use engine::{
    BatchState, BatchSummary, CANCELLED_REASON, CancelFlag, DEFAULT_CONCURRENCY, DownloadEngine,
    DownloadOutcome, DownloadRequest, EngineError, ItemResult, ProgressEvent, plan_requests,
};
pub use error::DownloadError;
pub use pacing::{Pacer, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
