//! Gallery export: turns a transform run's journal into input/output pairs.
//!
//! Each journal record names the source image it was made from and the file
//! it produced. The export maps both onto public URLs (a prefix plus the
//! file stem plus the served extension) so a static gallery can show the two
//! side by side. Records are deduplicated by id, last record wins, and the
//! list is sorted by original file name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::manifest::{JournalError, ManifestRecord, read_journal};

/// Default URL prefix of source images.
pub const DEFAULT_INPUT_PREFIX: &str = "/imgs";

/// Default URL prefix of transformed images.
pub const DEFAULT_OUTPUT_PREFIX: &str = "/imgs_transformed";

/// Default extension the gallery serves (outputs of a compress run).
pub const DEFAULT_SERVED_EXTENSION: &str = ".webp";

/// Errors raised while exporting gallery pairs.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The journal could not be read.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// The pair list could not be encoded.
    #[error("failed to encode gallery pairs: {0}")]
    Encode(#[from] serde_json::Error),

    /// The pair list could not be written.
    #[error("IO error writing {path}: {source}")]
    Write {
        /// Destination file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// URL layout of the exported pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Prefix of source image URLs.
    pub input_prefix: String,
    /// Prefix of transformed image URLs.
    pub output_prefix: String,
    /// Extension appended to both stems.
    pub extension: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            input_prefix: DEFAULT_INPUT_PREFIX.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            extension: DEFAULT_SERVED_EXTENSION.to_string(),
        }
    }
}

/// One gallery entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPair {
    /// Stem of the transformed file.
    pub id: String,
    /// URL of the source image.
    pub input_url: String,
    /// URL of the transformed image.
    pub output_url: String,
    /// File name of the source image.
    pub original_name: String,
}

/// Builds gallery pairs from journal records.
///
/// Records without a source are skipped.
#[must_use]
pub fn gallery_pairs(records: &[ManifestRecord], options: &ExportOptions) -> Vec<GalleryPair> {
    let mut latest: BTreeMap<&str, &ManifestRecord> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.source.is_empty()) {
        latest.insert(&record.id, record);
    }

    let mut pairs: Vec<GalleryPair> = latest
        .into_values()
        .map(|record| pair_for(record, options))
        .collect();
    pairs.sort_by(|a, b| a.original_name.cmp(&b.original_name));
    pairs
}

fn pair_for(record: &ManifestRecord, options: &ExportOptions) -> GalleryPair {
    let input = Path::new(&record.source);
    let input_stem = stem_of(input);
    let output_stem = stem_of(&record.output_path);
    GalleryPair {
        input_url: served_url(&options.input_prefix, &input_stem, &options.extension),
        output_url: served_url(&options.output_prefix, &output_stem, &options.extension),
        original_name: input
            .file_name()
            .map_or_else(|| record.source.clone(), |n| n.to_string_lossy().into_owned()),
        id: output_stem,
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn served_url(prefix: &str, stem: &str, extension: &str) -> String {
    format!("{}/{stem}{extension}", prefix.trim_end_matches('/'))
}

/// Reads `journal` and writes its gallery pairs to `destination` as a JSON array.
///
/// Returns the number of pairs written.
///
/// # Errors
///
/// Returns [`ExportError`] if the journal cannot be read or the destination
/// cannot be written.
#[instrument(level = "debug", skip_all, fields(journal = %journal.display(), destination = %destination.display()))]
pub async fn export_gallery(
    journal: &Path,
    destination: &Path,
    options: &ExportOptions,
) -> Result<usize, ExportError> {
    let records = read_journal(journal).await?;
    let pairs = gallery_pairs(&records, options);
    let mut json = serde_json::to_vec_pretty(&pairs)?;
    json.push(b'\n');

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ExportError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(destination, json)
        .await
        .map_err(|source| ExportError::Write {
            path: destination.to_path_buf(),
            source,
        })?;

    info!(
        pairs = pairs.len(),
        records = records.len(),
        path = %destination.display(),
        "Gallery pairs exported"
    );
    Ok(pairs.len())
}
