//! Processing functions applied to each work item.
//!
//! A [`Processor`] turns one [`WorkItem`] into an [`Artifact`] on disk or
//! fails with a staged [`ProcessError`]. The pool treats processors as
//! opaque: it adds timeouts, retries and journaling around them.
//!
//! - [`DownloadProcessor`] stores the source bytes unchanged.
//! - [`TransformProcessor`] routes them through a [`Transformer`] first.
//! - [`CompressProcessor`] re-encodes local images as WebP.

mod client;
mod compress;
mod download;
mod error;
pub mod storage;
mod transform;

pub use client::{CONNECT_TIMEOUT, FetchedBody, HttpClient, REQUEST_TIMEOUT};
pub use compress::{COMPRESS_EXTENSION, COMPRESSIBLE_EXTENSIONS, CompressProcessor, encode_webp};
pub use download::DownloadProcessor;
pub use error::{FetchError, ProcessError, TransformError};
pub use transform::{
    ChatImageTransformer, DEFAULT_MODEL, DEFAULT_PROMPT, ImageKind, ImagePayload,
    TRANSFORM_EXTENSION, TransformProcessor, Transformer, data_url, extract_image_payload,
};

use std::path::PathBuf;

use async_trait::async_trait;

use crate::item::WorkItem;

/// Output file written for a successful item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Final path of the output file.
    pub path: PathBuf,
    /// Size of the output file in bytes.
    pub size_bytes: u64,
}

/// One processing attempt for a work item.
///
/// Implementations must leave no file under the final output name unless
/// they return `Ok`; an attempt may be dropped at any await point when the
/// pool's timeout fires.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Processes `item` once.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] tagged with the failing stage.
    async fn process(&self, item: &WorkItem) -> Result<Artifact, ProcessError>;
}
