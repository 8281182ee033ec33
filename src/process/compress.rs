//! Compress processing function: re-encode local PNG/JPEG files as WebP.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, instrument};

use super::error::{FetchError, ProcessError, TransformError};
use super::storage::write_bytes_atomically;
use super::{Artifact, Processor};
use crate::item::WorkItem;

/// Extension of every compressed output.
pub const COMPRESS_EXTENSION: &str = ".webp";

/// Input extensions the compressor accepts.
pub const COMPRESSIBLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Stores each local image as `<output_dir>/<file stem>.webp`.
///
/// Outputs keep the input's file stem so a compressed download directory
/// lines up name for name with the compressed transform directory.
#[derive(Debug, Clone)]
pub struct CompressProcessor {
    output_dir: PathBuf,
}

impl CompressProcessor {
    /// Creates a compressor writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn output_path(&self, source: &Path, item: &WorkItem) -> PathBuf {
        let stem = source
            .file_stem()
            .map_or_else(|| item.id().to_string(), |s| s.to_string_lossy().into_owned());
        self.output_dir.join(format!("{stem}{COMPRESS_EXTENSION}"))
    }
}

#[async_trait]
impl Processor for CompressProcessor {
    fn name(&self) -> &'static str {
        "compress"
    }

    #[instrument(level = "debug", skip(self), fields(id = %item.id()))]
    async fn process(&self, item: &WorkItem) -> Result<Artifact, ProcessError> {
        let source = Path::new(item.source_locator());
        let input = tokio::fs::read(source)
            .await
            .map_err(|e| FetchError::read(source, e))?;
        let input_len = input.len();

        let output = tokio::task::spawn_blocking(move || encode_webp(&input))
            .await
            .map_err(|e| TransformError::codec(e.to_string()))??;
        debug!(input_len, output_len = output.len(), "re-encoded as webp");

        let path = self.output_path(source, item);
        let size_bytes = write_bytes_atomically(&path, &output).await?;
        Ok(Artifact { path, size_bytes })
    }
}

/// Decodes any supported image and re-encodes it as WebP.
///
/// # Errors
///
/// Returns [`TransformError::Codec`] if the bytes are not a decodable image.
pub fn encode_webp(input: &[u8]) -> Result<Vec<u8>, TransformError> {
    let decoded = image::load_from_memory(input).map_err(|e| TransformError::codec(e.to_string()))?;
    // The WebP encoder takes 8-bit RGB(A) only.
    let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());
    let mut buf = Cursor::new(Vec::new());
    rgba.write_to(&mut buf, ImageFormat::WebP)
        .map_err(|e| TransformError::codec(e.to_string()))?;
    Ok(buf.into_inner())
}
