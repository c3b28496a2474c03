//! Image normalization: decode, flatten transparency, re-encode.
//!
//! Raster payloads are decoded with the `image` crate, composited over an
//! opaque white background when they carry alpha, and re-encoded to the
//! requested [`TargetFormat`]. SVG documents are vector data and are passed
//! through byte for byte.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::constants::JPEG_QUALITY;
use super::error::DownloadError;

/// Extension used for SVG passthrough files.
pub const SVG_EXTENSION: &str = "svg";

/// Raster format every non-SVG image is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Baseline JPEG at quality 95.
    #[default]
    Jpg,
    /// Lossless PNG.
    Png,
}

impl TargetFormat {
    /// File extension (without dot) for this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            other => Err(format!("unsupported format '{other}' (expected jpg or png)")),
        }
    }
}

/// Bytes ready to be written, with the extension they must be saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    /// Encoded file contents.
    pub bytes: Vec<u8>,
    /// Extension without dot (`jpg`, `png` or `svg`).
    pub extension: &'static str,
}

impl NormalizedImage {
    /// Whether the payload was passed through as SVG.
    #[must_use]
    pub fn is_svg(&self) -> bool {
        self.extension == SVG_EXTENSION
    }
}

/// Converts fetched bytes into the form they are persisted in.
///
/// # Errors
///
/// Returns `DownloadError::Decode` if the payload is not a decodable raster
/// image or re-encoding fails.
#[instrument(skip(bytes), fields(url = %source_url, bytes = bytes.len(), target = %target))]
pub fn normalize(
    bytes: Vec<u8>,
    source_url: &str,
    target: TargetFormat,
) -> Result<NormalizedImage, DownloadError> {
    if looks_like_svg(source_url, &bytes) {
        debug!("svg passthrough");
        return Ok(NormalizedImage {
            bytes,
            extension: SVG_EXTENSION,
        });
    }

    let decoded =
        image::load_from_memory(&bytes).map_err(|e| DownloadError::decode(source_url, e))?;
    let rgb = flatten_onto_white(&decoded);
    let encoded = encode(&rgb, target).map_err(|e| DownloadError::decode(source_url, e))?;
    debug!(
        width = rgb.width(),
        height = rgb.height(),
        encoded_bytes = encoded.len(),
        "image re-encoded"
    );

    Ok(NormalizedImage {
        bytes: encoded,
        extension: target.extension(),
    })
}

/// Whether the URL path ends in `.svg` or the payload is an SVG document.
#[must_use]
pub fn looks_like_svg(source_url: &str, bytes: &[u8]) -> bool {
    let path = Url::parse(source_url).map_or_else(
        |_| source_url.split(['?', '#']).next().unwrap_or("").to_string(),
        |url| url.path().to_string(),
    );
    path.to_ascii_lowercase().ends_with(".svg") || has_svg_root(bytes)
}

/// Whether the first element of the document is `<svg>`.
///
/// A leading BOM, whitespace, the XML declaration, processing instructions,
/// comments and an SVG doctype are skipped. Any other markup first (an HTML
/// page embedding an inline `<svg>`, for instance) is not an SVG document.
fn has_svg_root(bytes: &[u8]) -> bool {
    let mut rest = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    loop {
        rest = rest.trim_ascii_start();
        if rest.starts_with(b"<?") {
            let Some(end) = find(rest, b"?>") else {
                return false;
            };
            rest = &rest[end + 2..];
        } else if rest.starts_with(b"<!--") {
            let Some(end) = find(&rest[4..], b"-->") else {
                return false;
            };
            rest = &rest[4 + end + 3..];
        } else if starts_with_ignore_case(rest, b"<!doctype") {
            let Some(end) = find(rest, b">") else {
                return false;
            };
            let root = rest[9..end].trim_ascii_start();
            if !starts_with_ignore_case(root, b"svg") {
                return false;
            }
            rest = &rest[end + 1..];
        } else {
            break;
        }
    }

    let Some(after) = rest.strip_prefix(b"<svg") else {
        return false;
    };
    after
        .first()
        .is_some_and(|&b| b == b'>' || b == b'/' || b.is_ascii_whitespace())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn starts_with_ignore_case(bytes: &[u8], prefix: &[u8]) -> bool {
    bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Composites any alpha channel over opaque white and drops it.
///
/// Palette images with a transparency entry decode to RGBA, so they take
/// the same path.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let alpha = u16::from(src[3]);
        for channel in 0..3 {
            let color = u16::from(src[channel]);
            let blended = (color * alpha + 255 * (255 - alpha) + 127) / 255;
            dst[channel] = u8::try_from(blended).unwrap_or(u8::MAX);
        }
    }
    rgb
}

fn encode(image: &RgbImage, target: TargetFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match target {
        TargetFormat::Jpg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            encoder.encode_image(image)?;
        }
        TargetFormat::Png => {
            image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
    }
    Ok(buf)
}
