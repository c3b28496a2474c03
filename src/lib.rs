//! Image Downloader Core Library
//!
//! This library provides the core functionality for the image downloader,
//! which discovers the images referenced by a web page and downloads a
//! selected subset into a local directory, normalized to a single raster
//! format.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`discovery`] - Candidate image URL extraction (static HTML and rendered pages)
//! - [`download`] - HTTP fetching, image normalization and the batch download engine
//! - [`config`] - Optional file configuration for CLI defaults
//! - [`user_agent`] - Browser identity pool used to vary outbound request headers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod discovery;
pub mod download;
#[cfg(test)]
pub(crate) mod test_support;
pub mod user_agent;

// Re-export commonly used types
pub use config::{FileConfig, LoadedConfig, VerbositySetting, load_default_file_config};
pub use discovery::{
    DiscoveryError, DiscoveryMode, Discoverer, DynamicExtractor, ImageCandidates, RenderEngine,
    RenderError, RenderSession, RenderSettings, extract_image_urls, is_valid_image_url,
    normalize_target_url, resolve,
};
pub use download::{
    BatchState, BatchSummary, CancelFlag, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES,
    DownloadEngine, DownloadError, DownloadOutcome, DownloadRequest, EngineError, HttpClient,
    ItemResult, Pacer, ProgressEvent, RetryPolicy, TargetFormat, normalize,
};
pub use user_agent::IdentityPool;
