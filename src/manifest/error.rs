//! Error types for the manifest journal and failure list.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening or appending to the manifest files.
///
/// Every variant is fatal to a run: once the journal cannot be written, no
/// further completion can be claimed safely.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Reading, writing, flushing or syncing a manifest file failed.
    #[error("journal IO error on {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Another process holds the journal lock.
    #[error("manifest journal {path} is locked by another run")]
    Locked {
        /// The locked journal.
        path: PathBuf,
    },

    /// A record could not be encoded as JSON.
    #[error("failed to encode manifest record for {id}: {source}")]
    Encode {
        /// The id of the record being written.
        id: String,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl JournalError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a lock-contention error.
    pub fn locked(path: impl Into<PathBuf>) -> Self {
        Self::Locked { path: path.into() }
    }
}
