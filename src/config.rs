//! Run configuration shared by every pipeline mode.
//!
//! The CLI maps its flags directly onto [`RunConfig`]; library callers build
//! one with [`RunConfig::new`] and the `with_*` setters. [`RunConfig::validate`]
//! enforces the invariants the pipeline relies on (`concurrency >= 1`,
//! `settle_rounds >= 1`, ...).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default number of re-attempts after a failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default cap on discovery rounds.
pub const DEFAULT_MAX_ROUNDS: u32 = 300;

/// Default number of consecutive rounds without new items that ends discovery.
pub const DEFAULT_SETTLE_ROUNDS: u32 = 6;

/// Default per-attempt timeout for plain downloads.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default per-attempt timeout when an external transform is involved.
pub const DEFAULT_TRANSFORM_TIMEOUT: Duration = Duration::from_secs(900);

/// Default base delay before a retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Errors raised by invalid run configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Concurrency outside the supported range.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// `settle_rounds` of zero would never end discovery on stagnation.
    #[error("invalid settle rounds 0: must be at least 1")]
    ZeroSettleRounds,

    /// `max_rounds` of zero would never run discovery.
    #[error("invalid max rounds 0: must be at least 1")]
    ZeroMaxRounds,

    /// A zero per-attempt timeout would fail every attempt.
    #[error("invalid timeout: must be greater than zero")]
    ZeroTimeout,
}

/// Configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Directory receiving output files, the manifest journal and the failure list.
    pub output_dir: PathBuf,
    /// Maximum number of in-flight processing invocations.
    pub concurrency: usize,
    /// Cap on discovery rounds.
    pub max_rounds: u32,
    /// Consecutive rounds without new items that end discovery.
    pub settle_rounds: u32,
    /// Pause between discovery rounds.
    pub round_pause: Duration,
    /// Timeout applied to each processing attempt.
    pub timeout: Duration,
    /// Re-attempts after the first failed attempt.
    pub max_retries: u32,
    /// Base delay before a retry (doubles per attempt, capped).
    pub retry_delay: Duration,
    /// Skip items already recorded as successes in the journal.
    pub resume: bool,
    /// Submit at most this many items (0 = no limit).
    pub limit: usize,
}

impl RunConfig {
    /// Creates a configuration with defaults for everything but the output directory.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
            max_rounds: DEFAULT_MAX_ROUNDS,
            settle_rounds: DEFAULT_SETTLE_ROUNDS,
            round_pause: Duration::ZERO,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            resume: true,
            limit: 0,
        }
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the discovery round cap and settle rounds.
    #[must_use]
    pub fn with_rounds(mut self, max_rounds: u32, settle_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self.settle_rounds = settle_rounds;
        self
    }

    /// Sets the pause between discovery rounds.
    #[must_use]
    pub fn with_round_pause(mut self, pause: Duration) -> Self {
        self.round_pause = pause;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry count and base retry delay.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Enables or disables resume from the existing journal.
    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Caps the number of submitted items (0 = no limit).
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Checks the invariants the pipeline depends on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        if self.settle_rounds == 0 {
            return Err(ConfigError::ZeroSettleRounds);
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::ZeroMaxRounds);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
