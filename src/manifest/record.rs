//! On-disk record formats: JSON journal lines and failure list lines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::outcome::{FailureStage, Outcome};

/// One journal line describing a completed item.
///
/// `id`, `outputPath` and `timestamp` are required when reading; the other
/// fields default so older or hand-edited journals still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    /// Work item id.
    pub id: String,
    /// Locator the item was fetched from.
    #[serde(default)]
    pub source: String,
    /// Path of the written output file.
    pub output_path: PathBuf,
    /// Size of the output file in bytes.
    #[serde(default)]
    pub size_bytes: u64,
    /// Completion time, Unix epoch milliseconds.
    pub timestamp: u64,
}

impl ManifestRecord {
    /// Builds the journal record for a success outcome; `None` for failures.
    #[must_use]
    pub fn from_outcome(outcome: &Outcome) -> Option<Self> {
        match outcome {
            Outcome::Success {
                id,
                source_locator,
                output_path,
                size_bytes,
                timestamp,
            } => Some(Self {
                id: id.clone(),
                source: source_locator.clone(),
                output_path: output_path.clone(),
                size_bytes: *size_bytes,
                timestamp: *timestamp,
            }),
            Outcome::Failure { .. } => None,
        }
    }

    /// Parses one journal line; blank or malformed lines yield `None`.
    #[must_use]
    pub fn parse_line(line: &[u8]) -> Option<Self> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        serde_json::from_slice::<Self>(line)
            .ok()
            .filter(|record| !record.id.is_empty())
    }
}

/// One failure list line: `<locator>\t<stage>: <reason>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Locator to re-feed on retry.
    pub source_locator: String,
    /// `<stage>: <reason>` description, single line.
    pub detail: String,
}

impl FailureRecord {
    /// Builds the failure list record for a failure outcome; `None` for successes.
    #[must_use]
    pub fn from_outcome(outcome: &Outcome) -> Option<Self> {
        match outcome {
            Outcome::Failure {
                source_locator,
                stage,
                reason,
                ..
            } => Some(Self::new(source_locator.clone(), *stage, reason)),
            Outcome::Success { .. } => None,
        }
    }

    /// Creates a record, flattening the reason onto one line.
    #[must_use]
    pub fn new(source_locator: String, stage: FailureStage, reason: &str) -> Self {
        let reason: String = reason
            .chars()
            .map(|c| if c == '\t' || c.is_control() { ' ' } else { c })
            .collect();
        Self {
            source_locator,
            detail: format!("{stage}: {}", reason.trim()),
        }
    }

    /// Formats the record as a failure list line, including the newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}\t{}\n", self.source_locator, self.detail)
    }

    /// Parses a failure list line. Lines without a tab are bare locators.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (locator, detail) = line.split_once('\t').unwrap_or((line, ""));
        let locator = locator.trim();
        if locator.is_empty() {
            return None;
        }
        Some(Self {
            source_locator: locator.to_string(),
            detail: detail.trim().to_string(),
        })
    }
}
