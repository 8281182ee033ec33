//! Work items and their deterministic identity.
//!
//! A [`WorkItem`] is one unit of discoverable content. Its `id` is derived
//! from the source locator alone, so re-scraping the same source always
//! yields the same id and the manifest can answer "already done?".

use std::fmt;

use sha2::{Digest, Sha256};

use crate::filename::{locator_stem, remote_url, sanitize_stem};

/// Number of hex characters of the locator digest kept in the id.
const DIGEST_PREFIX_LEN: usize = 12;

/// One unit of work: a locator to fetch plus its stable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    id: String,
    source_locator: String,
}

impl WorkItem {
    /// Creates a work item, deriving its id from `source_locator`.
    #[must_use]
    pub fn new(source_locator: impl Into<String>) -> Self {
        let source_locator = source_locator.into();
        let id = derive_id(&source_locator);
        Self { id, source_locator }
    }

    /// Stable identifier used for resume lookups and output file names.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// URL or local path the item is fetched from.
    #[must_use]
    pub fn source_locator(&self) -> &str {
        &self.source_locator
    }

    /// Returns true when the locator is an `http`/`https` URL.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        remote_url(&self.source_locator).is_some()
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.source_locator)
    }
}

/// Derives the id for a locator: `<sanitized stem>_<12 hex chars of SHA-256>`.
#[must_use]
pub fn derive_id(source_locator: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(source_locator.as_bytes()));
    let stem = sanitize_stem(&locator_stem(source_locator));
    format!("{stem}_{}", &digest[..DIGEST_PREFIX_LEN])
}
