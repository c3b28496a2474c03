//! Image discovery: from a target page to a deduplicated candidate list.
//!
//! Discovery first probes the target host, then either returns the target
//! itself (when it already is an image URL) or runs one of two extractors:
//!
//! - [`DiscoveryMode::Static`] fetches the page HTML and parses it
//! - [`DiscoveryMode::Rendered`] loads the page in a rendering engine,
//!   scrolls it to trigger lazy loading and reads the final DOM
//!
//! # Example
//!
//! ```no_run
//! use image_downloader_core::discovery::{Discoverer, DiscoveryMode};
//! use image_downloader_core::download::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let discoverer = Discoverer::new(HttpClient::new()?);
//! let candidates = discoverer
//!     .discover("example.com/gallery", DiscoveryMode::Static)
//!     .await?;
//! println!("Found {} images", candidates.len());
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "headless")]
mod chromium;
mod html;
mod render;
mod url;

use std::collections::HashSet;

use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::download::{DownloadError, HttpClient};

#[cfg(feature = "headless")]
pub use chromium::ChromiumEngine;
pub use html::{extract_image_urls, extract_img_sources, first_css_url};
pub use render::{
    DEFAULT_MAX_SCROLL_ITERATIONS, DEFAULT_SCROLL_PAUSE, DEFAULT_SETTLE_DELAY, DynamicExtractor,
    RenderEngine, RenderError, RenderSession, RenderSettings, RenderedPage,
};
pub use url::{SUPPORTED_EXTENSIONS, is_valid_image_url, normalize_target_url, probe_url, resolve};

/// Message shown when the pre-flight probe fails.
pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to connect to the website. Please check your internet connection or the URL.";

/// Errors that abort discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The typed target URL is unusable.
    #[error("invalid target URL '{input}': {reason}")]
    InvalidInput {
        /// What the user typed.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The connectivity probe failed; no extractor ran.
    #[error("{CONNECTIVITY_MESSAGE}")]
    Connectivity {
        /// The probed target.
        url: String,
        /// The probe failure.
        #[source]
        source: DownloadError,
    },

    /// The page HTML could not be fetched.
    #[error("failed to fetch images: {source}")]
    Fetch {
        /// The target page.
        url: String,
        /// The fetch failure.
        #[source]
        source: DownloadError,
    },

    /// The rendering engine failed.
    #[error("failed to fetch images: {source}")]
    Render {
        /// The target page.
        url: String,
        /// The engine failure.
        #[source]
        source: RenderError,
    },

    /// Rendered mode was requested but no rendering engine is configured.
    #[error("rendered discovery is unavailable: no rendering engine configured")]
    RenderUnavailable,
}

impl DiscoveryError {
    /// Creates an invalid-input error.
    pub fn invalid_input(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Which extractor runs for a non-image target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMode {
    /// Parse the HTML returned by a plain GET.
    #[default]
    Static,
    /// Parse the DOM of a rendered, scrolled page.
    Rendered,
}

/// Ordered, duplicate-free list of candidate image URLs.
///
/// Insertion order is discovery order; exact-string duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCandidates {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl ImageCandidates {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `url` unless already present. Returns whether it was added.
    pub fn push(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.urls.push(url);
        true
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Candidates in discovery order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.urls
    }

    /// Iterates candidates in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.urls.iter()
    }

    /// Consumes the list.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

impl<S: Into<String>> FromIterator<S> for ImageCandidates {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut candidates = Self::new();
        for url in iter {
            candidates.push(url);
        }
        candidates
    }
}

impl<'a> IntoIterator for &'a ImageCandidates {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for ImageCandidates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.urls)
    }
}

/// Runs discovery for a target URL.
#[derive(Debug, Clone)]
pub struct Discoverer {
    client: HttpClient,
    renderer: Option<DynamicExtractor>,
}

impl Discoverer {
    /// Creates a discoverer with static extraction only.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            renderer: None,
        }
    }

    /// Enables [`DiscoveryMode::Rendered`] through `renderer`.
    #[must_use]
    pub fn with_renderer(mut self, renderer: DynamicExtractor) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Whether rendered discovery is available.
    #[must_use]
    pub fn can_render(&self) -> bool {
        self.renderer.is_some()
    }

    /// Discovers candidate image URLs on `target`.
    ///
    /// Every call returns a fresh list; nothing carries over between calls.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::InvalidInput`] for an unusable target
    /// - [`DiscoveryError::Connectivity`] when the probe fails (no extractor runs)
    /// - [`DiscoveryError::Fetch`] / [`DiscoveryError::Render`] when extraction fails
    /// - [`DiscoveryError::RenderUnavailable`] for rendered mode without an engine
    #[instrument(skip(self), fields(target = %target))]
    pub async fn discover(
        &self,
        target: &str,
        mode: DiscoveryMode,
    ) -> Result<ImageCandidates, DiscoveryError> {
        let url = normalize_target_url(target)?;

        self.client
            .test_connection(&url)
            .await
            .map_err(|source| DiscoveryError::Connectivity {
                url: url.clone(),
                source,
            })?;

        if is_valid_image_url(&url) {
            debug!("target is itself an image");
            return Ok(std::iter::once(url).collect());
        }

        let urls = match mode {
            DiscoveryMode::Static => {
                let html = self
                    .client
                    .fetch_page(&url)
                    .await
                    .map_err(|source| DiscoveryError::Fetch {
                        url: url.clone(),
                        source,
                    })?;
                extract_image_urls(&html, &url)
            }
            DiscoveryMode::Rendered => {
                let renderer = self
                    .renderer
                    .as_ref()
                    .ok_or(DiscoveryError::RenderUnavailable)?;
                renderer
                    .extract(&url)
                    .await
                    .map_err(|source| DiscoveryError::Render {
                        url: url.clone(),
                        source,
                    })?
            }
        };

        let candidates: ImageCandidates = urls.into_iter().collect();
        info!(count = candidates.len(), ?mode, "discovery complete");
        Ok(candidates)
    }
}
