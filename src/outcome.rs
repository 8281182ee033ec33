//! Per-item outcomes produced by the work pool.

use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::item::WorkItem;
use crate::process::Artifact;

/// Pipeline step at which an item failed, used to triage the failure list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// Fetching the source bytes failed (network error, non-2xx, unreadable file).
    Fetch,
    /// Transforming the image failed (image-generation call or local re-encode).
    Transform,
    /// An attempt exceeded the configured timeout.
    Timeout,
    /// Writing the output file failed.
    Storage,
    /// The processing task panicked or was lost.
    Task,
}

impl FailureStage {
    /// Short tag written in front of the reason in the failure list.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Transform => "transform",
            Self::Timeout => "timeout",
            Self::Storage => "storage",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of processing one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The item's output file was fully written.
    Success {
        /// Work item id.
        id: String,
        /// Locator the item was fetched from.
        source_locator: String,
        /// Path of the written output file.
        output_path: PathBuf,
        /// Size of the output file in bytes.
        size_bytes: u64,
        /// Completion time, Unix epoch milliseconds.
        timestamp: u64,
    },
    /// All attempts failed.
    Failure {
        /// Work item id.
        id: String,
        /// Locator the item was fetched from.
        source_locator: String,
        /// Stage of the last failed attempt.
        stage: FailureStage,
        /// Human-readable reason of the last failed attempt.
        reason: String,
        /// Time the failure was decided, Unix epoch milliseconds.
        timestamp: u64,
    },
}

impl Outcome {
    /// Builds a success outcome for `item` from the written artifact.
    #[must_use]
    pub fn success(item: &WorkItem, artifact: Artifact) -> Self {
        Self::Success {
            id: item.id().to_string(),
            source_locator: item.source_locator().to_string(),
            output_path: artifact.path,
            size_bytes: artifact.size_bytes,
            timestamp: now_epoch_ms(),
        }
    }

    /// Builds a failure outcome for `item`.
    #[must_use]
    pub fn failure(item: &WorkItem, stage: FailureStage, reason: impl Into<String>) -> Self {
        Self::Failure {
            id: item.id().to_string(),
            source_locator: item.source_locator().to_string(),
            stage,
            reason: reason.into(),
            timestamp: now_epoch_ms(),
        }
    }

    /// Returns the work item id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => id,
        }
    }

    /// Returns the source locator.
    #[must_use]
    pub fn source_locator(&self) -> &str {
        match self {
            Self::Success { source_locator, .. } | Self::Failure { source_locator, .. } => {
                source_locator
            }
        }
    }

    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Current wall-clock time in Unix epoch milliseconds (0 if the clock is before the epoch).
#[must_use]
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
