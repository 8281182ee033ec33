//! Error types for item discovery.

use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::JournalError;
use crate::process::FetchError;

/// Errors raised while discovering work items. All of them end the run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A gallery page could not be fetched.
    #[error("failed to fetch page {url}: {source}")]
    Page {
        /// The page URL.
        url: String,
        /// The underlying fetch error.
        #[source]
        source: FetchError,
    },

    /// The page URL is not a valid http(s) URL.
    #[error("invalid page URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// An input directory could not be listed.
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        /// The directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A failure list could not be loaded.
    #[error("failed to load failure list: {0}")]
    FailureList(#[source] JournalError),

    /// Any other source-specific failure.
    #[error("item source failed: {reason}")]
    Other {
        /// What went wrong.
        reason: String,
    },
}

impl DiscoveryError {
    /// Creates a page fetch error.
    pub fn page(url: impl Into<String>, source: FetchError) -> Self {
        Self::Page {
            url: url.into(),
            source,
        }
    }

    /// Creates a generic source error.
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }
}
