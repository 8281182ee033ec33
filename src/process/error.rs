//! Error types for processing functions.
//!
//! Fetch and transform failures are kept in separate enums so the failure
//! list can be triaged by stage; [`ProcessError`] wraps both plus storage
//! errors and maps each onto a [`FailureStage`].

use std::path::PathBuf;

use thiserror::Error;

use crate::outcome::FailureStage;

/// Errors that can occur while fetching source bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client's own request timeout fired.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The locator is not a usable URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A local source file could not be read.
    #[error("IO error reading {path}: {source}")]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a local read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the external image-transformation call.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The request to the transform endpoint failed.
    #[error("transform request to {endpoint} failed: {source}")]
    Request {
        /// Endpoint that was called.
        endpoint: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The transform endpoint answered with a non-2xx status.
    #[error("transform endpoint {endpoint} returned HTTP {status}: {body}")]
    HttpStatus {
        /// Endpoint that was called.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("invalid transform response: {reason}")]
    InvalidResponse {
        /// What was wrong with the response.
        reason: String,
    },

    /// The reply contained neither inline image data nor an image URL.
    #[error("transform reply contained no image: {excerpt}")]
    MissingImage {
        /// Start of the reply text.
        excerpt: String,
    },

    /// Inline image data was not valid base64.
    #[error("transform reply carried invalid base64 image data: {source}")]
    InvalidPayload {
        /// The underlying decode error.
        #[source]
        source: base64::DecodeError,
    },

    /// The image URL named in the reply could not be downloaded.
    #[error("failed to download transformed image: {source}")]
    ResultDownload {
        /// The underlying fetch error.
        #[source]
        source: FetchError,
    },

    /// A local image could not be decoded or re-encoded.
    #[error("image re-encode failed: {reason}")]
    Codec {
        /// What the codec reported.
        reason: String,
    },
}

impl TransformError {
    /// Creates a codec error.
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }
}

/// Error returned by a [`Processor`](super::Processor) attempt.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Fetching the source failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The external transform failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Writing the output file failed.
    #[error("IO error writing to {path}: {source}")]
    Storage {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Creates a storage error.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Stage tag recorded in the failure list.
    #[must_use]
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Fetch(_) => FailureStage::Fetch,
            Self::Transform(_) => FailureStage::Transform,
            Self::Storage { .. } => FailureStage::Storage,
        }
    }
}
