//! Shared User-Agent strings for page, image and transform HTTP traffic.

/// Default User-Agent for every request the harvester makes (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("image-harvester/{version} (batch-image-tool)")
}

/// Browser User-Agent for gallery pages that reject unknown clients.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
