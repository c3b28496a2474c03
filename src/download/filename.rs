//! Filename derivation and collision handling for saved images.
//!
//! A saved image is named after the last path segment of its URL with the
//! extension replaced by the output format. Characters outside the
//! alphanumerics and `. _ -` / space are dropped, which also removes every
//! path separator. An empty result falls back to `image_<n>`, where `n` is
//! the 1-based position of the URL in its batch.

use std::collections::HashSet;

use tracing::debug;
use url::Url;

/// Returns the percent-decoded last path segment of `url`.
///
/// Unparseable input is treated as a raw path: query and fragment are cut
/// and the text after the final `/` is used.
pub(crate) fn last_path_segment(url: &str) -> Option<String> {
    let raw = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)?,
        Err(_) => {
            let without_fragment = url.split('#').next().unwrap_or(url);
            let path = without_fragment.split('?').next().unwrap_or(without_fragment);
            path.rsplit('/').next().unwrap_or(path).to_string()
        }
    };

    if raw.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(&raw).map_or_else(
        |e| {
            debug!(segment = %raw, error = %e, "URL decoding failed, using raw segment");
            raw.clone()
        },
        std::borrow::Cow::into_owned,
    );
    Some(decoded)
}

/// Splits `name` into stem and extension (without the dot).
///
/// Leading dots belong to the stem, so `.hidden` has no extension.
pub(crate) fn split_extension(name: &str) -> (&str, Option<&str>) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(pos) => {
            let split = leading + pos;
            (&name[..split], Some(&name[split + 1..]))
        }
        None => (name, None),
    }
}

/// Strips the extension of a path segment and keeps only filesystem-safe characters.
#[must_use]
pub fn sanitize_stem(segment: &str) -> String {
    let (stem, _) = split_extension(segment);
    stem.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect()
}

/// Builds `<stem>.<extension>` for a raw path segment, or the positional
/// placeholder when nothing usable remains.
#[must_use]
pub fn filename_from_segment(segment: &str, position: usize, extension: &str) -> String {
    let stem = sanitize_stem(segment);
    if stem.is_empty() {
        format!("image_{position}.{extension}")
    } else {
        format!("{stem}.{extension}")
    }
}

/// Builds the filename for `url` at batch `position` (1-based).
#[must_use]
pub fn filename_for_url(url: &str, position: usize, extension: &str) -> String {
    let segment = last_path_segment(url).unwrap_or_default();
    filename_from_segment(&segment, position, extension)
}

/// Hands out unique filenames within one batch.
///
/// The first claim of a name keeps it; later claims of the same name
/// (compared case-insensitively, for case-folding filesystems) receive
/// `_2`, `_3`, ... before the extension.
#[derive(Debug, Default)]
pub(crate) struct FilenamePlanner {
    claimed: HashSet<String>,
}

impl FilenamePlanner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn claim(&mut self, filename: &str) -> String {
        if self.claimed.insert(filename.to_lowercase()) {
            return filename.to_string();
        }

        let (stem, extension) = split_extension(filename);
        let mut suffix = 2usize;
        loop {
            let candidate = match extension {
                Some(ext) => format!("{stem}_{suffix}.{ext}"),
                None => format!("{stem}_{suffix}"),
            };
            if self.claimed.insert(candidate.to_lowercase()) {
                debug!(original = %filename, renamed = %candidate, "filename collision in batch");
                return candidate;
            }
            suffix += 1;
        }
    }
}
