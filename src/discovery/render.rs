//! Rendered-page extraction through a pluggable rendering engine.
//!
//! The [`RenderEngine`] and [`RenderSession`] traits describe the handful
//! of capabilities discovery needs from a browser: navigate, measure and
//! scroll the document, read the final markup and the computed background
//! images. [`DynamicExtractor`] drives a session through the settle, scroll
//! and extract protocol and always closes it afterwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::html::{extract_img_sources, first_css_url};
use super::url::{is_valid_image_url, resolve};
use crate::user_agent::IdentityPool;

/// Upper bound on scroll iterations for pages that keep growing.
pub const DEFAULT_MAX_SCROLL_ITERATIONS: u32 = 20;

/// Wait after navigation before the first measurement.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Wait after each scroll before re-measuring.
pub const DEFAULT_SCROLL_PAUSE: Duration = Duration::from_secs(2);

/// Errors raised by a rendering engine.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The engine could not start a session.
    #[error("failed to launch rendering engine: {message}")]
    Launch {
        /// Engine-specific detail.
        message: String,
    },

    /// Navigation to the target failed.
    #[error("failed to load {url}: {message}")]
    Navigation {
        /// The target URL.
        url: String,
        /// Engine-specific detail.
        message: String,
    },

    /// Evaluating a script or reading page state failed.
    #[error("page script failed: {message}")]
    Script {
        /// Engine-specific detail.
        message: String,
    },

    /// The session was used after it was closed or the engine went away.
    #[error("rendering session closed")]
    Closed,
}

impl RenderError {
    /// Creates a launch error.
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a script error.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }
}

/// Starts rendering sessions.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Opens a fresh session presenting `user_agent`.
    async fn open(&self, user_agent: &str) -> Result<Box<dyn RenderSession>, RenderError>;
}

/// One live page in a rendering engine.
#[async_trait]
pub trait RenderSession: Send {
    /// Loads `url`.
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Current scrollable height of the document.
    async fn document_height(&mut self) -> Result<u64, RenderError>;

    /// Scrolls the viewport to the bottom of the document.
    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError>;

    /// Serialized markup of the rendered document.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Computed `background-image` values of every element that has one
    /// (values other than `none`, unparsed).
    async fn computed_background_images(&mut self) -> Result<Vec<String>, RenderError>;

    /// Releases the session.
    async fn close(&mut self) -> Result<(), RenderError>;
}

/// Timing and bounds of the render protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Wait after navigation.
    pub settle_delay: Duration,
    /// Wait after every scroll.
    pub scroll_pause: Duration,
    /// Maximum number of scroll iterations.
    pub max_scroll_iterations: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            scroll_pause: DEFAULT_SCROLL_PAUSE,
            max_scroll_iterations: DEFAULT_MAX_SCROLL_ITERATIONS,
        }
    }
}

/// Markup and background images read from a rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    /// Final serialized markup.
    pub html: String,
    /// Resolved, valid image URLs from computed background styles.
    pub background_urls: Vec<String>,
    /// Number of scroll iterations performed.
    pub scroll_iterations: u32,
}

impl RenderedPage {
    /// `<img>` candidates from the markup followed by the background candidates.
    #[must_use]
    pub fn candidates(&self, base_url: &str) -> Vec<String> {
        let mut urls = extract_img_sources(&self.html, base_url);
        urls.extend(self.background_urls.iter().cloned());
        urls
    }
}

/// Drives a [`RenderEngine`] through the settle, scroll and extract protocol.
#[derive(Clone)]
pub struct DynamicExtractor {
    engine: Arc<dyn RenderEngine>,
    identities: Arc<IdentityPool>,
    settings: RenderSettings,
}

impl std::fmt::Debug for DynamicExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicExtractor")
            .field("identities", &self.identities.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DynamicExtractor {
    /// Creates an extractor over `engine`.
    #[must_use]
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        identities: Arc<IdentityPool>,
        settings: RenderSettings,
    ) -> Self {
        Self {
            engine,
            identities,
            settings,
        }
    }

    /// The configured protocol settings.
    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Renders `url` and returns its candidates, `<img>` results first.
    ///
    /// # Errors
    ///
    /// Returns the first [`RenderError`] raised by the engine.
    pub async fn extract(&self, url: &str) -> Result<Vec<String>, RenderError> {
        let page = self.render(url).await?;
        Ok(page.candidates(url))
    }

    /// Renders `url`, scrolling until the document stops growing or the
    /// iteration bound is reached.
    ///
    /// The session is closed on every path; a close failure after a
    /// successful render is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns the first [`RenderError`] raised by the engine.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        let user_agent = self.identities.pick();
        debug!(user_agent, "opening rendering session");
        let mut session = self.engine.open(user_agent).await?;

        let result = self.drive(session.as_mut(), url).await;
        close_session(session.as_mut()).await;
        result
    }

    async fn drive(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
    ) -> Result<RenderedPage, RenderError> {
        session.navigate(url).await?;
        tokio::time::sleep(self.settings.settle_delay).await;

        let scroll_iterations = self.scroll_until_stable(session).await?;

        let html = session.content().await?;
        let background_urls = session
            .computed_background_images()
            .await?
            .iter()
            .filter_map(|value| first_css_url(value))
            .filter_map(|reference| resolve(url, &reference))
            .filter(|candidate| is_valid_image_url(candidate))
            .collect::<Vec<_>>();

        info!(
            html_len = html.len(),
            backgrounds = background_urls.len(),
            scroll_iterations,
            "page rendered"
        );
        Ok(RenderedPage {
            html,
            background_urls,
            scroll_iterations,
        })
    }

    async fn scroll_until_stable(&self, session: &mut dyn RenderSession) -> Result<u32, RenderError> {
        let mut last_height = session.document_height().await?;
        let mut iterations = 0;

        while iterations < self.settings.max_scroll_iterations {
            session.scroll_to_bottom().await?;
            tokio::time::sleep(self.settings.scroll_pause).await;
            iterations += 1;

            let height = session.document_height().await?;
            debug!(iterations, last_height, height, "scrolled");
            if height == last_height {
                return Ok(iterations);
            }
            last_height = height;
        }

        warn!(
            max = self.settings.max_scroll_iterations,
            "document kept growing, stopping scroll"
        );
        Ok(iterations)
    }
}

/// Closes `session`, logging a failure instead of returning it.
///
/// Returns whether the session closed cleanly.
pub(crate) async fn close_session(session: &mut dyn RenderSession) -> bool {
    match session.close().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "failed to close rendering session");
            false
        }
    }
}
