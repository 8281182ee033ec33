//! Round-based item discovery.
//!
//! Sources that reveal content incrementally (pagination, "load more"
//! buttons) implement [`ItemSource`]: each call to
//! [`discover`](ItemSource::discover) returns everything the source can see
//! at that round. [`Discovery`] drives the rounds, drops ids seen in earlier
//! rounds, and stops when
//!
//! - `settle_rounds` consecutive rounds brought nothing new,
//! - `max_rounds` rounds have run, or
//! - the source reports it has nothing more to reveal.
//!
//! [`Discovery::into_stream`] exposes the result as a lazy stream so work
//! can start while later rounds are still pending.

mod error;
mod html;
mod local;

pub use error::DiscoveryError;
pub use html::{PAGE_PLACEHOLDER, PagedHtmlSource, extract_image_urls};
pub use local::{DirectorySource, FailureListSource};

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, stream};
use tracing::{debug, info, instrument};

use crate::item::WorkItem;

/// Items visible to a source at one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRound {
    /// Every item the source can see now, including ones reported before.
    pub items: Vec<WorkItem>,
    /// False when the source knows there is nothing left to reveal.
    pub has_more: bool,
}

impl SourceRound {
    /// A final round: `items` and nothing after them.
    #[must_use]
    pub fn last(items: Vec<WorkItem>) -> Self {
        Self {
            items,
            has_more: false,
        }
    }
}

/// A collaborator that reveals work items round by round.
#[async_trait]
pub trait ItemSource: Send {
    /// Returns the items visible at `round` (1-indexed).
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the source cannot be read; the run ends.
    async fn discover(&mut self, round: u32) -> Result<SourceRound, DiscoveryError>;
}

/// Why discovery stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `settle_rounds` consecutive rounds without new items.
    Settled,
    /// The round cap was reached.
    RoundCap,
    /// The source reported nothing more to reveal.
    Exhausted,
}

/// Drives an [`ItemSource`] through rounds and deduplicates its items.
pub struct Discovery {
    source: Box<dyn ItemSource>,
    max_rounds: u32,
    settle_rounds: u32,
    pause: Duration,
    seen: HashSet<String>,
    stagnant_rounds: u32,
    rounds_run: u32,
    stopped: Option<StopReason>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("max_rounds", &self.max_rounds)
            .field("settle_rounds", &self.settle_rounds)
            .field("rounds_run", &self.rounds_run)
            .field("seen", &self.seen.len())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Discovery {
    /// Creates a driver running at most `max_rounds` rounds and stopping
    /// after `settle_rounds` rounds without new items.
    #[must_use]
    pub fn new(source: Box<dyn ItemSource>, max_rounds: u32, settle_rounds: u32) -> Self {
        Self {
            source,
            max_rounds,
            settle_rounds: settle_rounds.max(1),
            pause: Duration::ZERO,
            seen: HashSet::new(),
            stagnant_rounds: 0,
            rounds_run: 0,
            stopped: None,
        }
    }

    /// Waits `pause` between rounds.
    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Number of rounds run so far.
    #[must_use]
    pub fn rounds_run(&self) -> u32 {
        self.rounds_run
    }

    /// Why discovery stopped, once it has.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    /// Runs one round and returns the items not seen before, or `None`
    /// once discovery has stopped.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] from the source.
    #[instrument(level = "debug", skip(self), fields(round = self.rounds_run + 1))]
    pub async fn next_round(&mut self) -> Result<Option<Vec<WorkItem>>, DiscoveryError> {
        if self.stopped.is_some() {
            return Ok(None);
        }
        if self.rounds_run >= self.max_rounds {
            self.stop(StopReason::RoundCap);
            return Ok(None);
        }
        if self.rounds_run > 0 && !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }

        self.rounds_run += 1;
        let SourceRound { items, has_more } = self.source.discover(self.rounds_run).await?;
        let new_items: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| self.seen.insert(item.id().to_string()))
            .collect();

        if new_items.is_empty() {
            self.stagnant_rounds += 1;
        } else {
            self.stagnant_rounds = 0;
        }
        debug!(
            new = new_items.len(),
            total = self.seen.len(),
            stagnant = self.stagnant_rounds,
            has_more,
            "discovery round finished"
        );

        if self.stagnant_rounds >= self.settle_rounds {
            self.stop(StopReason::Settled);
        } else if !has_more {
            self.stop(StopReason::Exhausted);
        } else if self.rounds_run >= self.max_rounds {
            self.stop(StopReason::RoundCap);
        }
        Ok(Some(new_items))
    }

    fn stop(&mut self, reason: StopReason) {
        info!(
            rounds = self.rounds_run,
            items = self.seen.len(),
            reason = ?reason,
            "discovery finished"
        );
        self.stopped = Some(reason);
    }

    /// Converts the driver into a lazy stream of new items.
    ///
    /// The stream ends after the last round, or after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<WorkItem, DiscoveryError>> + Send {
        stream::try_unfold(
            (self, VecDeque::new()),
            |(mut discovery, mut pending)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Ok(Some((item, (discovery, pending))));
                    }
                    match discovery.next_round().await {
                        Ok(Some(items)) => pending.extend(items),
                        Ok(None) => return Ok(None),
                        Err(error) => return Err(error),
                    }
                }
            },
        )
    }
}
