//! Single-round sources backed by local files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{DiscoveryError, ItemSource, SourceRound};
use crate::item::WorkItem;
use crate::manifest::{FAILURE_LIST_FILE, JOURNAL_FILE, load_failure_list};
use crate::process::storage::PARTIAL_SUFFIX;

/// Lists the regular files of a directory, sorted by name.
///
/// GIFs, hidden files, in-progress `.part` files and the manifest's own
/// journal and failure list are skipped, so a download output directory
/// can be fed straight into a transform run.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extensions: Option<Vec<String>>,
}

impl DirectorySource {
    /// Creates a source over `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extensions: None,
        }
    }

    /// Keeps only files whose extension is one of `extensions` (case-insensitive).
    #[must_use]
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = Some(
            extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        );
        self
    }

    fn wants(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        path.extension().is_some_and(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            allowed.iter().any(|a| *a == ext)
        })
    }
}

#[async_trait]
impl ItemSource for DirectorySource {
    #[instrument(level = "debug", skip(self), fields(dir = %self.dir.display()))]
    async fn discover(&mut self, _round: u32) -> Result<SourceRound, DiscoveryError> {
        let read_err = |source: std::io::Error| DiscoveryError::ReadDir {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(read_err)?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let path = entry.path();
            if !entry.file_type().await.map_err(read_err)?.is_file() {
                continue;
            }
            if is_gif(&path) || is_hidden(&path) || is_bookkeeping(&path) || !self.wants(&path) {
                debug!(path = %path.display(), "skipping");
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        let items = paths
            .into_iter()
            .map(|path| WorkItem::new(path.to_string_lossy().into_owned()))
            .collect();
        Ok(SourceRound::last(items))
    }
}

fn is_gif(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"))
}

fn is_bookkeeping(path: &Path) -> bool {
    path.file_name().is_some_and(|name| {
        let name = name.to_string_lossy();
        name == JOURNAL_FILE || name == FAILURE_LIST_FILE || name.ends_with(PARTIAL_SUFFIX)
    })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

/// Re-feeds the locators of a previous run's failure list.
#[derive(Debug, Clone)]
pub struct FailureListSource {
    path: PathBuf,
}

impl FailureListSource {
    /// Creates a source reading the failure list at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ItemSource for FailureListSource {
    async fn discover(&mut self, _round: u32) -> Result<SourceRound, DiscoveryError> {
        let items = load_failure_list(&self.path)
            .await
            .map_err(DiscoveryError::FailureList)?;
        debug!(path = %self.path.display(), items = items.len(), "failure list loaded");
        Ok(SourceRound::last(items))
    }
}
