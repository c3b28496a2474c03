//! HTTP client wrapper for page and image fetches.
//!
//! This module provides the `HttpClient` struct which performs the three
//! network operations of the pipeline: the pre-flight connectivity probe,
//! the page HTML fetch and the image byte fetch. Every request carries a
//! browser identity drawn at random from an [`IdentityPool`].

use std::sync::Arc;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, DNT, REFERER, RETRY_AFTER,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, FETCH_TIMEOUT_SECS, MAX_BODY_BYTES, PROBE_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::discovery::probe_url;
use crate::user_agent::IdentityPool;

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
    image/webp,image/apng,*/*;q=0.8";

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// HTTP client for fetching pages and images.
///
/// This client is designed to be created once and shared (it is cheap to
/// clone), taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use image_downloader_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// client.test_connection("https://example.com/gallery").await?;
/// let bytes = client.fetch("https://example.com/cat.png").await?;
/// println!("fetched {} bytes", bytes.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    identities: Arc<IdentityPool>,
    fetch_timeout: Duration,
    probe_timeout: Duration,
    max_body_bytes: u64,
}

impl HttpClient {
    /// Creates a client with the default identity pool and timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 10 seconds
    /// - Fetch timeout: 15 seconds
    /// - Probe timeout: 5 seconds
    /// - Gzip decompression: enabled
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_settings(
            Arc::new(IdentityPool::default()),
            Duration::from_secs(FETCH_TIMEOUT_SECS),
            Duration::from_secs(PROBE_TIMEOUT_SECS),
        )
    }

    /// Creates a client with an explicit identity pool and timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be initialized.
    #[instrument(level = "debug", skip(identities), fields(identities = identities.len()))]
    pub fn with_settings(
        identities: Arc<IdentityPool>,
        fetch_timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(fetch_timeout))
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            identities,
            fetch_timeout,
            probe_timeout,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    /// Overrides the largest accepted response body.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// The identity pool requests draw their User-Agent from.
    #[must_use]
    pub fn identities(&self) -> &Arc<IdentityPool> {
        &self.identities
    }

    /// Checks that the host serving `url` answers at all.
    ///
    /// Sends a HEAD request to the scheme and host of `url`. Any HTTP
    /// response, including error statuses, counts as reachable.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::InvalidUrl` when `url` has no host, and
    /// `DownloadError::Connectivity` (or `Timeout`) when the host cannot be
    /// reached within the probe timeout.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn test_connection(&self, url: &str) -> Result<(), DownloadError> {
        let origin = probe_url(url).ok_or_else(|| DownloadError::invalid_url(url))?;
        debug!(origin = %origin, "probing connectivity");

        let response = self
            .client
            .head(&origin)
            .header(USER_AGENT, self.identities.pick())
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(&origin)
                } else {
                    DownloadError::connectivity(&origin, e)
                }
            })?;

        debug!(status = response.status().as_u16(), "connectivity probe answered");
        Ok(())
    }

    /// Fetches the HTML of a page with browser-like request headers.
    ///
    /// The body is decoded with the charset named by the `Content-Type`
    /// header, then by a `<meta>` charset declaration near the top of the
    /// document, and as UTF-8 otherwise.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch`](Self::fetch).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &str) -> Result<String, DownloadError> {
        let referer = probe_url(url).map(|origin| format!("{origin}/"));
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, PAGE_ACCEPT)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(DNT, "1")
            .header(UPGRADE_INSECURE_REQUESTS, "1");
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = self.send_checked(url, request).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = read_body(response, url, self.max_body_bytes).await?;
        let html = decode_page(&body, content_type.as_deref());
        info!(bytes = body.len(), "page fetched");
        Ok(html)
    }

    /// Fetches the raw bytes of an image.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The host cannot be reached (`Connectivity`) or the timeout elapses (`Timeout`)
    /// - The server returns an error status (`HttpStatus`, with `Retry-After` captured)
    /// - The body exceeds the size limit (`TooLarge`)
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let request = self.client.get(url).header(ACCEPT, IMAGE_ACCEPT);
        let body = self.execute(url, request).await?;
        debug!(bytes = body.len(), "image fetched");
        Ok(body)
    }

    async fn execute(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, DownloadError> {
        let response = self.send_checked(url, request).await?;
        read_body(response, url, self.max_body_bytes).await
    }

    /// Sends the request and rejects error statuses and oversized declared bodies.
    async fn send_checked(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = request
            .header(USER_AGENT, self.identities.pick())
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            warn!(declared = ?declared, limit = self.max_body_bytes, "declared body too large");
            return Err(DownloadError::too_large(url, self.max_body_bytes));
        }

        Ok(response)
    }
}

/// Decodes page bytes to text using the declared charset, defaulting to UTF-8.
fn decode_page(body: &[u8], content_type: Option<&str>) -> String {
    let label = content_type
        .and_then(charset_from_content_type)
        .or_else(|| charset_from_meta(body));
    let encoding = label
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        debug!(encoding = used.name(), "page contained malformed sequences");
    }
    text.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches(['"', '\'']);
        (!label.is_empty()).then(|| label.to_owned())
    })
}

/// Finds `charset=` in the first kilobyte, covering both `<meta charset>`
/// and the `http-equiv` form.
fn charset_from_meta(body: &[u8]) -> Option<String> {
    let prefix = &body[..body.len().min(1024)];
    let head = String::from_utf8_lossy(prefix).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    (!label.is_empty()).then_some(label)
}

/// Collects a response body, aborting once `limit` bytes are exceeded.
async fn read_body(
    response: reqwest::Response,
    url: &str,
    limit: u64,
) -> Result<Vec<u8>, DownloadError> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;
        if body.len() as u64 + chunk.len() as u64 > limit {
            return Err(DownloadError::too_large(url, limit));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

fn map_send_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else if error.is_connect() {
        DownloadError::connectivity(url, error)
    } else {
        DownloadError::network(url, error)
    }
}
