//! URL resolution and image-candidate classification.

use tracing::debug;
use url::Url;

use super::DiscoveryError;

/// Path extensions (lower-case, with dot) that mark a URL as an image candidate.
pub const SUPPORTED_EXTENSIONS: [&str; 9] = [
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".tiff", ".ico",
];

/// Resolves `reference` against `base`.
///
/// Absolute references come back unchanged (after URL normalization);
/// relative ones follow standard base-relative resolution. Returns `None`
/// when either side is malformed.
///
/// # Examples
///
/// ```
/// use image_downloader_core::resolve;
///
/// assert_eq!(
///     resolve("https://example.test/gallery/", "../a.jpg").as_deref(),
///     Some("https://example.test/a.jpg")
/// );
/// assert_eq!(resolve("not a url", "a.jpg"), None);
/// ```
#[must_use]
pub fn resolve(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    let base = Url::parse(base).ok()?;
    match base.join(reference) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(e) => {
            debug!(reference, error = %e, "unresolvable reference");
            None
        }
    }
}

/// Whether the lower-cased path of `url` ends with a supported image extension.
///
/// Query and fragment are ignored. Malformed URLs are not valid.
#[must_use]
pub fn is_valid_image_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Normalizes a typed target URL.
///
/// Surrounding whitespace is trimmed and `https://` is prepended when no
/// `http://` or `https://` scheme is present.
///
/// # Errors
///
/// Returns [`DiscoveryError::InvalidInput`] for empty input or when the
/// result does not parse as a URL with a host.
pub fn normalize_target_url(input: &str) -> Result<String, DiscoveryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DiscoveryError::invalid_input(input, "URL is empty"));
    }

    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate)
        .map_err(|e| DiscoveryError::invalid_input(input, e.to_string()))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(DiscoveryError::invalid_input(input, "URL has no host"));
    }
    Ok(parsed.to_string())
}

/// Scheme, host and port of `url`, the target of the connectivity probe.
#[must_use]
pub fn probe_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}
