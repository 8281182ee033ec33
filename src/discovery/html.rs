//! HTTP gallery source: one page fetch per round, image URLs pulled from markup.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::{DiscoveryError, ItemSource, SourceRound};
use crate::filename::remote_url;
use crate::item::WorkItem;
use crate::process::HttpClient;

/// Placeholder in a page URL template replaced by the round number.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Path suffixes that mark a URL as a probable image.
const IMAGE_SUFFIXES: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".webp", ".gif", ".bmp", ".svg", ".avif", ".heic",
];

/// Attributes of `<img>` that may carry the image URL (lazy loaders use the `data-*` ones).
const IMG_URL_ATTRS: &[&str] = &[
    "src",
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-url",
    "data-img",
];

#[allow(clippy::expect_used)]
static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("img selector is valid"));

#[allow(clippy::expect_used)]
static SOURCE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("source[srcset]").expect("source selector is valid"));

#[allow(clippy::expect_used)]
static STYLED_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[style]").expect("style selector is valid"));

#[allow(clippy::expect_used)]
static BACKGROUND_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)background-image\s*:\s*url\(\s*(?:"([^"]*)"|'([^']*)'|([^'")\s]+))\s*\)"#)
        .expect("background-image regex is valid")
});

/// Fetches a gallery page each round and reports the images on it.
///
/// With a [`PAGE_PLACEHOLDER`] in the URL, round `n` fetches page `n` and
/// the source keeps going while the page still shows the configured
/// "load more" text (or, with no text configured, until discovery settles).
/// Without the placeholder the page is fetched once.
#[derive(Debug, Clone)]
pub struct PagedHtmlSource {
    client: HttpClient,
    url_template: String,
    load_more_text: Option<String>,
}

impl PagedHtmlSource {
    /// Creates a source for `url_template`.
    #[must_use]
    pub fn new(client: HttpClient, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            load_more_text: None,
        }
    }

    /// Continues paging only while the page contains `text`.
    #[must_use]
    pub fn with_load_more_text(mut self, text: impl Into<String>) -> Self {
        self.load_more_text = Some(text.into()).filter(|t| !t.is_empty());
        self
    }

    fn is_paged(&self) -> bool {
        self.url_template.contains(PAGE_PLACEHOLDER)
    }

    /// URL fetched at `round`.
    #[must_use]
    pub fn page_url(&self, round: u32) -> String {
        self.url_template
            .replace(PAGE_PLACEHOLDER, &round.to_string())
    }
}

#[async_trait]
impl ItemSource for PagedHtmlSource {
    #[instrument(level = "debug", skip(self))]
    async fn discover(&mut self, round: u32) -> Result<SourceRound, DiscoveryError> {
        let url = self.page_url(round);
        let base = remote_url(&url).ok_or_else(|| DiscoveryError::InvalidUrl { url: url.clone() })?;
        let html = self
            .client
            .fetch_text(&url)
            .await
            .map_err(|source| DiscoveryError::page(&url, source))?;

        let items: Vec<WorkItem> = extract_image_urls(&html, &base)
            .into_iter()
            .map(WorkItem::new)
            .collect();
        let has_more = self.is_paged()
            && self
                .load_more_text
                .as_ref()
                .is_none_or(|text| html.contains(text.as_str()));

        debug!(url = %url, images = items.len(), has_more, "page scanned");
        Ok(SourceRound { items, has_more })
    }
}

/// Extracts image URLs from page markup, resolved against `base`.
///
/// Parses the markup and looks at `<img>` URL attributes, the last `srcset`
/// candidate of `<img>` and `<source>`, and inline `background-image: url(...)`
/// styles. Attribute values arrive entity-decoded. `data:`,
/// `blob:` and `javascript:` URLs are dropped, fragments removed and
/// duplicates collapsed. Probable images (known suffix) come first, then
/// the rest, each group sorted.
#[must_use]
pub fn extract_image_urls(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut raw: Vec<&str> = Vec::new();

    for img in document.select(&IMG_SELECTOR) {
        let element = img.value();
        raw.extend(IMG_URL_ATTRS.iter().filter_map(|attr| element.attr(attr)));
        raw.extend(element.attr("srcset").and_then(srcset_candidate));
    }
    for source in document.select(&SOURCE_SELECTOR) {
        raw.extend(source.value().attr("srcset").and_then(srcset_candidate));
    }
    for styled in document.select(&STYLED_SELECTOR) {
        let Some(style) = styled.value().attr("style") else {
            continue;
        };
        raw.extend(BACKGROUND_URL_RE.captures_iter(style).filter_map(|captures| {
            captures
                .get(1)
                .or_else(|| captures.get(2))
                .or_else(|| captures.get(3))
                .map(|value| value.as_str())
        }));
    }

    let mut cleaned: Vec<String> = raw
        .into_iter()
        .filter_map(|value| clean_url(value, base))
        .collect();
    cleaned.sort_by(|a, b| {
        (!is_probable_image(a), a.as_str()).cmp(&(!is_probable_image(b), b.as_str()))
    });
    cleaned.dedup();
    cleaned
}

/// Last candidate of a `srcset` value, usually the highest resolution.
fn srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .map(str::trim)
        .rfind(|candidate| !candidate.is_empty())
        .and_then(|candidate| candidate.split_whitespace().next())
}

fn clean_url(value: &str, base: &Url) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let lower = value.to_ascii_lowercase();
    if ["data:", "blob:", "javascript:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }
    let mut url = base.join(value).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn is_probable_image(url: &str) -> bool {
    Url::parse(url).is_ok_and(|url| {
        let path = url.path().to_ascii_lowercase();
        IMAGE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
    })
}
