//! Static HTML extraction of image candidates.
//!
//! Two passes over the parsed document: `<img src>` first, then inline
//! `background-image` styles. Parsing is tolerant (html5ever via `scraper`),
//! so malformed markup yields whatever candidates are recoverable.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use super::url::{is_valid_image_url, resolve};

static IMG_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("img[src]").ok());

static STYLED_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("[style]").ok());

static CSS_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)url\(\s*([^)]*?)\s*\)").ok());

/// Extracts candidate image URLs from `html`, resolved against `base_url`.
///
/// `<img>` results precede background-image results; within each pass the
/// document order is kept. Duplicates are not removed here.
///
/// # Examples
///
/// ```
/// use image_downloader_core::extract_image_urls;
///
/// let html = r#"<img src="/a.jpg"><div style="background-image:url('b.png')"></div>"#;
/// assert_eq!(
///     extract_image_urls(html, "https://example.test/gallery"),
///     ["https://example.test/a.jpg", "https://example.test/b.png"]
/// );
/// ```
#[must_use]
#[instrument(skip(html), fields(html_len = html.len()))]
pub fn extract_image_urls(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls = img_sources(&document, base_url);
    urls.extend(inline_backgrounds(&document, base_url));
    debug!(count = urls.len(), "static extraction complete");
    urls
}

/// Runs only the `<img src>` pass.
#[must_use]
pub fn extract_img_sources(html: &str, base_url: &str) -> Vec<String> {
    img_sources(&Html::parse_document(html), base_url)
}

fn img_sources(document: &Html, base_url: &str) -> Vec<String> {
    let Some(selector) = IMG_SELECTOR.as_ref() else {
        return Vec::new();
    };
    document
        .select(selector)
        .filter_map(|element| element.value().attr("src"))
        .filter_map(|src| resolve(base_url, src))
        .filter(|url| is_valid_image_url(url))
        .collect()
}

fn inline_backgrounds(document: &Html, base_url: &str) -> Vec<String> {
    let Some(selector) = STYLED_SELECTOR.as_ref() else {
        return Vec::new();
    };
    document
        .select(selector)
        .filter_map(|element| element.value().attr("style"))
        .filter(|style| style.contains("background-image"))
        .filter_map(first_css_url)
        .filter_map(|reference| resolve(base_url, &reference))
        .filter(|url| is_valid_image_url(url))
        .collect()
}

/// Returns the first `url(...)` token of a CSS value, whitespace and
/// surrounding quotes stripped.
///
/// ```
/// use image_downloader_core::discovery::first_css_url;
///
/// assert_eq!(first_css_url(r#"background: url( "a.png" ), url(b.png)"#).as_deref(), Some("a.png"));
/// assert_eq!(first_css_url("none"), None);
/// ```
#[must_use]
pub fn first_css_url(css: &str) -> Option<String> {
    let captures = CSS_URL.as_ref()?.captures(css)?;
    let inner = captures.get(1)?.as_str().trim();
    let unquoted = inner.trim_matches(|c| c == '"' || c == '\'').trim();
    (!unquoted.is_empty()).then(|| unquoted.to_string())
}
