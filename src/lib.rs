//! Image Harvester Core Library
//!
//! This library provides the core of the harvester tool: a resumable,
//! concurrency-bounded batch pipeline that discovers images on a paginated
//! source, downloads them (optionally transforming each one through an
//! external image-generation API), and checkpoints every completed item in
//! an append-only manifest journal.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`discovery`] - Round-based item discovery with settle/round-cap termination
//! - [`manifest`] - Append-only success journal, failure list, seen-ID set
//! - [`pool`] - Bounded work pool with per-attempt timeout and retries
//! - [`process`] - Pluggable processing functions (download, transform)
//! - [`pipeline`] - Wires discovery, resume filtering, pool, and manifest together
//! - [`export`] - Gallery input/output pairs built from a finished journal

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod discovery;
pub mod export;
pub mod filename;
pub mod item;
pub mod manifest;
pub mod outcome;
pub mod pipeline;
pub mod pool;
pub mod process;
mod user_agent;

// Re-export commonly used types
pub use config::{
    ConfigError, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_MAX_ROUNDS,
    DEFAULT_SETTLE_ROUNDS, RunConfig,
};
pub use discovery::{
    DirectorySource, Discovery, DiscoveryError, FailureListSource, ItemSource, PagedHtmlSource,
    SourceRound,
};
pub use item::WorkItem;
pub use manifest::{FAILURE_LIST_FILE, JOURNAL_FILE, JournalError, ManifestRecord, ManifestStore};
pub use outcome::{FailureStage, Outcome};
pub use pipeline::{PipelineError, run_pipeline};
pub use pool::{PoolError, RetryPolicy, RunSummary, WorkPool};
pub use process::{
    Artifact, ChatImageTransformer, CompressProcessor, DownloadProcessor, FetchError, HttpClient, ProcessError,
    Processor, TransformError, TransformProcessor, Transformer,
};
