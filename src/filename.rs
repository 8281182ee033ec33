//! Filename stems and extensions for harvested images.
//!
//! Output files are named `<id><ext>`, where the id already carries a
//! sanitized stem (see [`crate::item`]). This module derives that stem and
//! picks the extension from the locator suffix or the response content type.

use std::path::Path;

use url::Url;

/// Maximum characters kept from a locator's stem.
pub const MAX_STEM_CHARS: usize = 80;

/// Extension used when neither the locator nor the content type identify the format.
pub const FALLBACK_EXTENSION: &str = ".img";

/// Longest locator suffix (including the dot) accepted as an extension.
const MAX_SUFFIX_LEN: usize = 6;

/// Returns the readable stem of a locator: the last URL path segment
/// (percent-decoded) or the file name of a local path, without extension.
#[must_use]
pub fn locator_stem(locator: &str) -> String {
    let name = match remote_url(locator) {
        Some(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .map(|segment| {
                urlencoding::decode(&segment)
                    .map(std::borrow::Cow::into_owned)
                    .unwrap_or(segment)
            })
            .unwrap_or_default(),
        None => Path::new(locator)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    Path::new(&name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sanitizes a stem for filesystem safety.
///
/// Keeps letters and digits from any script plus `-`, `_` and `.`; every
/// other run of characters collapses into a single `_`. Leading and trailing
/// separators are trimmed, the result is capped at [`MAX_STEM_CHARS`], and an
/// empty result becomes `image`.
#[must_use]
pub fn sanitize_stem(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || matches!(c, '-' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }

    let trimmed: String = out
        .trim_matches(|c| c == '_' || c == '.')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed
    }
}

/// Picks the output extension (with leading dot) for a fetched image.
///
/// The locator's own suffix wins when it looks like an extension; otherwise
/// the content type decides, falling back to [`FALLBACK_EXTENSION`].
#[must_use]
pub fn extension_for(locator: &str, content_type: Option<&str>) -> String {
    if let Some(ext) = extension_from_locator(locator) {
        return ext;
    }
    content_type
        .and_then(extension_from_content_type)
        .unwrap_or(FALLBACK_EXTENSION)
        .to_string()
}

pub(crate) fn extension_from_locator(locator: &str) -> Option<String> {
    let last_segment = match remote_url(locator) {
        Some(url) => url.path_segments()?.next_back()?.to_string(),
        None => Path::new(locator).file_name()?.to_string_lossy().into_owned(),
    };
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index..];
    if ext.len() <= 1 || ext.len() > MAX_SUFFIX_LEN {
        return None;
    }
    if !ext[1..].chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Guess image extension from a Content-Type header.
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let ext = match mime.as_str() {
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        "image/svg+xml" => ".svg",
        "image/avif" => ".avif",
        "image/bmp" => ".bmp",
        "image/heic" => ".heic",
        _ => return None,
    };
    Some(ext)
}

/// Parses `locator` as a URL only when it is an `http`/`https` URL.
pub(crate) fn remote_url(locator: &str) -> Option<Url> {
    Url::parse(locator)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}
