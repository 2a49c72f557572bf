//! Operator photo sources and alternate-format sibling URLs.
//!
//! The backend serves every operator photo as a raster file and, next to it,
//! the same image in an alternate format. When only the raster URL is known
//! the sibling is found by swapping the file extension of the last path
//! segment.

use serde::{Deserialize, Serialize};

use crate::constants::ALT_IMAGE_EXTENSION;

/// A photo URL plus its optional alternate-format variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhotoSource {
    pub url: String,
    pub alt_url: Option<String>,
}

impl PhotoSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alt_url: None,
        }
    }

    pub fn with_alt(url: impl Into<String>, alt_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            alt_url: alt_url.filter(|alt| !alt.is_empty()),
        }
    }

    /// Build from optional wire fields. Empty URLs count as absent.
    pub fn from_parts(url: Option<String>, alt_url: Option<String>) -> Option<Self> {
        url.filter(|u| !u.is_empty())
            .map(|u| Self::with_alt(u, alt_url))
    }

    /// The explicit alternate URL, or one derived from `url`.
    pub fn alt_or_derived(&self) -> Option<String> {
        self.alt_url
            .clone()
            .or_else(|| sibling_with_extension(&self.url, ALT_IMAGE_EXTENSION))
    }
}

/// Replace the extension of the last path segment of `url` with `extension`.
///
/// Query strings and fragments are preserved. A segment without an extension
/// gets one appended. Returns `None` when the URL has no file segment at all
/// (e.g. a bare host or a trailing slash).
pub fn sibling_with_extension(url: &str, extension: &str) -> Option<String> {
    let suffix_at = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    let (path, suffix) = url.split_at(suffix_at);

    // Skip past "scheme://host" so dots in the host are never treated as an extension.
    let path_start = match path.find("://") {
        Some(scheme_end) => {
            let host_start = scheme_end + 3;
            match path[host_start..].find('/') {
                Some(slash) => host_start + slash,
                None => return None,
            }
        }
        None => 0,
    };

    let segment_start = path[path_start..]
        .rfind('/')
        .map(|i| path_start + i + 1)
        .unwrap_or(path_start);
    let segment = &path[segment_start..];
    if segment.is_empty() {
        return None;
    }

    let stem_len = match segment.rfind('.') {
        // A leading dot names a hidden file, not an extension.
        Some(0) | None => segment.len(),
        Some(dot) => dot,
    };

    Some(format!(
        "{}{}.{}{}",
        &path[..segment_start],
        &segment[..stem_len],
        extension,
        suffix
    ))
}
