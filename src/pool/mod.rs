//! Bounded work pool with per-attempt timeout and retry support.
//!
//! The pool pulls items from a stream, skips ids the manifest already holds,
//! and runs at most `concurrency` processing invocations at once. A semaphore
//! permit is taken when an item is admitted and travels with its task; the
//! coordinator drops it only after the item's outcome has been recorded in
//! the [`ManifestStore`], so a freed slot always follows a durable record.
//!
//! Each attempt runs under [`tokio::time::timeout`]. Failed attempts are
//! retried per the [`RetryPolicy`] until the budget is spent, and only the
//! final outcome of an item is recorded and reported.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! use futures_util::stream;
//! use harvester_core::{DownloadProcessor, HttpClient, ManifestStore, RetryPolicy, WorkItem, WorkPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut manifest = ManifestStore::open("./imgs".as_ref(), true).await?;
//! let processor = Arc::new(DownloadProcessor::new(HttpClient::new()?, "./imgs"));
//! let pool = WorkPool::new(8, RetryPolicy::default(), Duration::from_secs(60))?;
//! let items = stream::iter(vec![Ok(WorkItem::new("https://example.com/pig.png"))]);
//! let summary = pool
//!     .run(items, processor, &mut manifest, &Arc::new(AtomicBool::new(false)), |_| {})
//!     .await?;
//! println!("succeeded: {}, failed: {}", summary.succeeded, summary.failed);
//! # Ok(())
//! # }
//! ```

pub mod retry;

pub use retry::{RetryDecision, RetryPolicy};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::config::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::discovery::DiscoveryError;
use crate::item::WorkItem;
use crate::manifest::{JournalError, ManifestStore};
use crate::outcome::{FailureStage, Outcome};
use crate::process::Processor;

/// How often the coordinator re-checks the interrupt flag while idle.
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error type for work pool operations.
///
/// Per-item failures never surface here; they become [`Outcome::Failure`]
/// records. These errors end the whole run.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The item stream failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// An outcome could not be recorded.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Counts from one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items whose success was recorded.
    pub succeeded: usize,
    /// Items whose final failure was recorded.
    pub failed: usize,
    /// Re-attempts made across all items.
    pub retried: usize,
    /// Items skipped because the manifest already held them.
    pub skipped: usize,
    /// Items received from the stream.
    pub discovered: usize,
    /// True when the run stopped on the interrupt flag.
    pub interrupted: bool,
}

impl RunSummary {
    /// Items with a recorded outcome (succeeded + failed).
    #[must_use]
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Semaphore-bounded executor for processing functions.
#[derive(Debug, Clone)]
pub struct WorkPool {
    concurrency: usize,
    retry_policy: RetryPolicy,
    timeout: Duration,
    limit: usize,
}

impl WorkPool {
    /// Creates a pool with the given concurrency, retry policy and per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConcurrency`] if `concurrency` is outside
    /// `1..=100`.
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, PoolError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(PoolError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            concurrency,
            retry_policy,
            timeout,
            limit: 0,
        })
    }

    /// Admits at most `limit` items per run (0 = no limit). Skipped items
    /// do not count.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Runs every item of `items` through `processor`.
    ///
    /// Items the manifest already has are skipped. Each final outcome is
    /// recorded in `manifest` and then passed to `on_outcome`, in
    /// completion order. When `interrupted` becomes true, no further item is
    /// admitted and in-flight tasks are aborted without being recorded.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Discovery`] if the stream fails and
    /// [`PoolError::Journal`] if an outcome cannot be recorded. In-flight
    /// tasks are aborted in both cases.
    #[instrument(skip_all, fields(concurrency = self.concurrency, processor = processor.name()))]
    pub async fn run<S, F>(
        &self,
        items: S,
        processor: Arc<dyn Processor>,
        manifest: &mut ManifestStore,
        interrupted: &Arc<AtomicBool>,
        mut on_outcome: F,
    ) -> Result<RunSummary, PoolError>
    where
        S: Stream<Item = Result<WorkItem, DiscoveryError>> + Send,
        F: FnMut(&Outcome),
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let retried = Arc::new(AtomicUsize::new(0));
        let mut in_flight: JoinSet<(Outcome, OwnedSemaphorePermit)> = JoinSet::new();
        let mut in_flight_items: HashMap<Id, WorkItem> = HashMap::new();
        let mut summary = RunSummary::default();
        let mut admitted = 0usize;
        let mut stream_done = false;

        info!(
            concurrency = self.concurrency,
            max_attempts = self.retry_policy.max_attempts(),
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            "starting work pool"
        );

        let mut items = std::pin::pin!(items);
        loop {
            if interrupted.load(Ordering::SeqCst) {
                info!(in_flight = in_flight.len(), "interrupt received, stopping admission");
                summary.interrupted = true;
                break;
            }
            if stream_done && in_flight.is_empty() {
                break;
            }

            let has_capacity = semaphore.available_permits() > 0;
            tokio::select! {
                biased;

                Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    let outcome = match joined {
                        Ok((id, (outcome, permit))) => {
                            in_flight_items.remove(&id);
                            // Permit stays held until the record is durable.
                            let recorded = record_outcome(manifest, &outcome, &mut summary).await;
                            drop(permit);
                            recorded.map(|()| outcome)
                        }
                        Err(join_error) => {
                            let outcome = task_failure(&mut in_flight_items, &join_error);
                            record_outcome(manifest, &outcome, &mut summary)
                                .await
                                .map(|()| outcome)
                        }
                    };
                    match outcome {
                        Ok(outcome) => on_outcome(&outcome),
                        Err(error) => {
                            in_flight.abort_all();
                            drain(&mut in_flight).await;
                            return Err(error);
                        }
                    }
                }

                next = items.next(), if !stream_done && has_capacity => {
                    match next {
                        None => {
                            debug!(discovered = summary.discovered, "item stream exhausted");
                            stream_done = true;
                        }
                        Some(Err(error)) => {
                            warn!(error = %error, "item stream failed, aborting run");
                            in_flight.abort_all();
                            drain(&mut in_flight).await;
                            return Err(error.into());
                        }
                        Some(Ok(item)) => {
                            summary.discovered += 1;
                            if manifest.has(item.id()) {
                                debug!(id = %item.id(), "already completed, skipping");
                                summary.skipped += 1;
                                continue;
                            }

                            let permit = Arc::clone(&semaphore)
                                .try_acquire_owned()
                                .map_err(|_| PoolError::SemaphoreClosed)?;
                            let task_item = item.clone();
                            let handle = in_flight.spawn(process_item(
                                task_item,
                                Arc::clone(&processor),
                                self.retry_policy.clone(),
                                self.timeout,
                                Arc::clone(&retried),
                                permit,
                            ));
                            in_flight_items.insert(handle.id(), item);

                            admitted += 1;
                            if self.limit > 0 && admitted >= self.limit {
                                info!(limit = self.limit, "item limit reached");
                                stream_done = true;
                            }
                        }
                    }
                }

                () = tokio::time::sleep(INTERRUPT_POLL_INTERVAL) => {}
            }
        }

        if !in_flight.is_empty() {
            in_flight.abort_all();
            drain(&mut in_flight).await;
        }

        summary.retried = retried.load(Ordering::SeqCst);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            retried = summary.retried,
            skipped = summary.skipped,
            interrupted = summary.interrupted,
            "work pool finished"
        );
        Ok(summary)
    }
}

/// Records a final outcome and updates the summary counters.
async fn record_outcome(
    manifest: &mut ManifestStore,
    outcome: &Outcome,
    summary: &mut RunSummary,
) -> Result<(), PoolError> {
    manifest.record(outcome).await?;
    match outcome {
        Outcome::Success { id, .. } => {
            summary.succeeded += 1;
            debug!(id = %id, "item succeeded");
        }
        Outcome::Failure {
            id, stage, reason, ..
        } => {
            summary.failed += 1;
            warn!(id = %id, stage = %stage, reason = %reason, "item failed");
        }
    }
    Ok(())
}

/// Runs all attempts for one item and returns its final outcome with the permit.
async fn process_item(
    item: WorkItem,
    processor: Arc<dyn Processor>,
    policy: RetryPolicy,
    timeout: Duration,
    retried: Arc<AtomicUsize>,
    permit: OwnedSemaphorePermit,
) -> (Outcome, OwnedSemaphorePermit) {
    let mut attempt = 1;
    loop {
        let (stage, reason) = match tokio::time::timeout(timeout, processor.process(&item)).await
        {
            Ok(Ok(artifact)) => return (Outcome::success(&item, artifact), permit),
            Ok(Err(error)) => (error.stage(), error.to_string()),
            Err(_) => (FailureStage::Timeout, format!("timeout after {timeout:?}")),
        };

        match policy.should_retry(attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                debug!(
                    id = %item.id(),
                    attempt,
                    stage = %stage,
                    reason = %reason,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "attempt failed, retrying"
                );
                retried.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                attempt = next_attempt;
            }
            RetryDecision::DoNotRetry { .. } => {
                return (Outcome::failure(&item, stage, reason), permit);
            }
        }
    }
}

/// Builds the failure outcome for a task that panicked or was cancelled.
fn task_failure(in_flight_items: &mut HashMap<Id, WorkItem>, join_error: &JoinError) -> Outcome {
    let reason = if join_error.is_panic() {
        "processing task panicked".to_string()
    } else {
        format!("processing task failed: {join_error}")
    };
    match in_flight_items.remove(&join_error.id()) {
        Some(item) => Outcome::failure(&item, FailureStage::Task, reason),
        None => {
            warn!(task = %join_error.id(), "lost track of failed task");
            Outcome::failure(
                &WorkItem::new(format!("unknown-task-{}", join_error.id())),
                FailureStage::Task,
                reason,
            )
        }
    }
}

async fn drain(in_flight: &mut JoinSet<(Outcome, OwnedSemaphorePermit)>) {
    while in_flight.join_next().await.is_some() {}
}
