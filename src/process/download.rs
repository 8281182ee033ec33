//! Download processing function: fetch the source and store it unchanged.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::instrument;

use super::client::{HttpClient, content_type_of};
use super::error::ProcessError;
use super::storage::{write_bytes_atomically, write_stream_atomically};
use super::{Artifact, Processor};
use crate::filename::extension_for;
use crate::item::WorkItem;

/// Stores each item as `<output_dir>/<id><ext>`.
///
/// The extension comes from the locator, then from the response's
/// `Content-Type`, then falls back to `.img`. Local locators are copied.
#[derive(Debug, Clone)]
pub struct DownloadProcessor {
    client: HttpClient,
    output_dir: PathBuf,
}

impl DownloadProcessor {
    /// Creates a download processor writing into `output_dir`.
    #[must_use]
    pub fn new(client: HttpClient, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
        }
    }

    fn output_path(&self, item: &WorkItem, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{}{extension}", item.id()))
    }
}

#[async_trait]
impl Processor for DownloadProcessor {
    fn name(&self) -> &'static str {
        "download"
    }

    #[instrument(level = "debug", skip(self), fields(id = %item.id()))]
    async fn process(&self, item: &WorkItem) -> Result<Artifact, ProcessError> {
        let locator = item.source_locator();
        if item.is_remote() {
            let response = self.client.get(locator).await?;
            let content_type = content_type_of(&response);
            let path = self.output_path(item, &extension_for(locator, content_type.as_deref()));
            let size_bytes = write_stream_atomically(response, locator, &path).await?;
            return Ok(Artifact { path, size_bytes });
        }

        let body = self.client.read_source(locator).await?;
        let path = self.output_path(item, &extension_for(locator, None));
        let size_bytes = write_bytes_atomically(&path, &body.bytes).await?;
        Ok(Artifact { path, size_bytes })
    }
}
