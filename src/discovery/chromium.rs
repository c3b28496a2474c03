//! Headless Chromium backend for [`RenderEngine`], over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::render::{RenderEngine, RenderError, RenderSession, close_session};

const DOCUMENT_HEIGHT_JS: &str =
    "document.body ? document.body.scrollHeight : document.documentElement.scrollHeight";

const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0); true";

const COMPUTED_BACKGROUNDS_JS: &str = r"(() => {
    const results = [];
    for (const element of document.querySelectorAll('*')) {
        const value = window.getComputedStyle(element).backgroundImage;
        if (value && value !== 'none') {
            results.push(value);
        }
    }
    return results;
})()";

const BROWSER_ARGS: [&str; 4] = [
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--disable-extensions",
];

/// Launches one headless Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine {
    no_sandbox: bool,
}

impl ChromiumEngine {
    /// Creates an engine with the default browser arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes `--no-sandbox`, needed when running as root in containers.
    #[must_use]
    pub fn no_sandbox(mut self, enabled: bool) -> Self {
        self.no_sandbox = enabled;
        self
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    #[instrument(skip(self))]
    async fn open(&self, user_agent: &str) -> Result<Box<dyn RenderSession>, RenderError> {
        let mut builder = BrowserConfig::builder()
            .args(BROWSER_ARGS)
            .arg(format!("--user-agent={user_agent}"));
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(RenderError::launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::launch(e.to_string()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut session = ChromiumSession {
                    browser,
                    page: None,
                    handler_task: Some(handler_task),
                };
                close_session(&mut session).await;
                return Err(RenderError::launch(e.to_string()));
            }
        };
        debug!("chromium session opened");

        Ok(Box::new(ChromiumSession {
            browser,
            page: Some(page),
            handler_task: Some(handler_task),
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page.as_ref().ok_or(RenderError::Closed)
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(
        &self,
        expression: &str,
    ) -> Result<T, RenderError> {
        self.page()?
            .evaluate(expression)
            .await
            .map_err(|e| RenderError::script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| RenderError::script(e.to_string()))
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.page()?
            .goto(url)
            .await
            .map_err(|e| RenderError::navigation(url, e.to_string()))?;
        Ok(())
    }

    async fn document_height(&mut self) -> Result<u64, RenderError> {
        self.evaluate::<u64>(DOCUMENT_HEIGHT_JS).await
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
        self.evaluate::<bool>(SCROLL_TO_BOTTOM_JS).await.map(|_| ())
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.page()?
            .content()
            .await
            .map_err(|e| RenderError::script(e.to_string()))
    }

    async fn computed_background_images(&mut self) -> Result<Vec<String>, RenderError> {
        self.evaluate::<Vec<String>>(COMPUTED_BACKGROUNDS_JS).await
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.page = None;
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "chromium process did not exit cleanly");
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        closed.map(|_| ()).map_err(|e| RenderError::script(e.to_string()))
    }
}
