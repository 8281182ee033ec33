//! End-to-end pipeline: discovery, resume filter, work pool, manifest.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::{ConfigError, RunConfig};
use crate::discovery::{Discovery, DiscoveryError, ItemSource};
use crate::manifest::{JournalError, ManifestStore};
use crate::outcome::Outcome;
use crate::pool::{PoolError, RetryPolicy, RunSummary, WorkPool};
use crate::process::Processor;

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The item source failed.
    #[error("discovery failed: {0}")]
    Discovery(#[source] DiscoveryError),

    /// The manifest could not be opened or written.
    #[error("manifest journal failed: {0}")]
    Journal(#[source] JournalError),

    /// The work pool failed for another reason.
    #[error("work pool failed: {0}")]
    Pool(#[source] PoolError),
}

impl From<PoolError> for PipelineError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::Discovery(source) => Self::Discovery(source),
            PoolError::Journal(source) => Self::Journal(source),
            other => Self::Pool(other),
        }
    }
}

/// Runs one batch: discovers items from `source`, skips ids already in the
/// journal (when `config.resume`), processes the rest with bounded
/// concurrency, and records every final outcome.
///
/// `on_outcome` sees each recorded outcome in completion order. Setting
/// `interrupted` stops admission and returns with `summary.interrupted`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the configuration is invalid, the journal
/// cannot be opened or written, or discovery fails. Per-item failures are
/// not errors; they are counted in the summary and written to the failure
/// list.
#[instrument(skip_all, fields(output_dir = %config.output_dir.display()))]
pub async fn run_pipeline<F>(
    config: &RunConfig,
    source: Box<dyn ItemSource>,
    processor: Arc<dyn Processor>,
    interrupted: &Arc<AtomicBool>,
    on_outcome: F,
) -> Result<RunSummary, PipelineError>
where
    F: FnMut(&Outcome),
{
    config.validate()?;

    let mut manifest = ManifestStore::open(&config.output_dir, config.resume)
        .await
        .map_err(PipelineError::Journal)?;
    if manifest.skipped_lines() > 0 {
        warn!(
            skipped_lines = manifest.skipped_lines(),
            completed = manifest.completed_count(),
            "resuming from a journal with malformed lines"
        );
    }

    let items = Discovery::new(source, config.max_rounds, config.settle_rounds)
        .with_pause(config.round_pause)
        .into_stream();
    let pool = WorkPool::new(
        config.concurrency,
        RetryPolicy::new(config.max_retries, config.retry_delay),
        config.timeout,
    )?
    .with_limit(config.limit);

    let summary = pool
        .run(items, processor, &mut manifest, interrupted, on_outcome)
        .await?;

    info!(
        discovered = summary.discovered,
        skipped = summary.skipped,
        succeeded = summary.succeeded,
        failed = summary.failed,
        completed_total = manifest.completed_count(),
        failure_lines = manifest.failures_written(),
        journal = %manifest.journal_path().display(),
        "pipeline finished"
    );
    if manifest.failures_written() > 0 {
        info!(failure_list = %manifest.failure_list_path().display(), "failures recorded");
    }
    Ok(summary)
}
