//! In-memory item sources and processors for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::process::{Artifact, FetchError, ProcessError, Processor};
use harvester_core::{DiscoveryError, ItemSource, SourceRound, WorkItem};

/// Locator of the `n`-th fake image.
#[must_use]
pub fn locator(n: usize) -> String {
    format!("https://gallery.example.com/img/{n:03}.png")
}

/// Source that reveals `per_round` more images each round until `total`,
/// re-reporting everything seen so far (like a "load more" gallery).
pub struct GrowingSource {
    per_round: usize,
    total: usize,
    fail_at_round: Option<u32>,
    rounds: Arc<AtomicU32>,
}

impl GrowingSource {
    #[must_use]
    pub fn new(per_round: usize, total: usize, rounds: &Arc<AtomicU32>) -> Self {
        Self {
            per_round,
            total,
            fail_at_round: None,
            rounds: Arc::clone(rounds),
        }
    }

    #[must_use]
    pub fn failing_at(mut self, round: u32) -> Self {
        self.fail_at_round = Some(round);
        self
    }
}

#[async_trait]
impl ItemSource for GrowingSource {
    async fn discover(&mut self, round: u32) -> Result<SourceRound, DiscoveryError> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        if self.fail_at_round == Some(round) {
            return Err(DiscoveryError::other(format!("round {round} unreachable")));
        }
        let visible = (round as usize * self.per_round).min(self.total);
        Ok(SourceRound {
            items: (0..visible).map(|n| WorkItem::new(locator(n))).collect(),
            has_more: true,
        })
    }
}

/// Single-round source over a fixed list of locators.
pub struct FixedSource {
    locators: Vec<String>,
}

impl FixedSource {
    #[must_use]
    pub fn new(locators: Vec<String>) -> Self {
        Self { locators }
    }

    #[must_use]
    pub fn numbered(count: usize) -> Self {
        Self::new((0..count).map(locator).collect())
    }
}

#[async_trait]
impl ItemSource for FixedSource {
    async fn discover(&mut self, _round: u32) -> Result<SourceRound, DiscoveryError> {
        Ok(SourceRound::last(
            self.locators.iter().map(WorkItem::new).collect(),
        ))
    }
}

/// Processor that writes `<id>.bin` into its output directory and records
/// how it was called.
pub struct FileWritingProcessor {
    output_dir: PathBuf,
    delay: Duration,
    always_fail: HashSet<String>,
    fail_first: HashMap<String, usize>,
    calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FileWritingProcessor {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            delay: Duration::ZERO,
            always_fail: HashSet::new(),
            fail_first: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Sleeps `delay` inside every attempt.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every attempt for `locator` fails with HTTP 500.
    #[must_use]
    pub fn failing(mut self, locator: impl Into<String>) -> Self {
        self.always_fail.insert(locator.into());
        self
    }

    /// The first `attempts` attempts for `locator` fail with HTTP 503.
    #[must_use]
    pub fn flaky(mut self, locator: impl Into<String>, attempts: usize) -> Self {
        self.fail_first.insert(locator.into(), attempts);
        self
    }

    /// Attempts made for `locator`.
    #[must_use]
    pub fn calls_for(&self, locator: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(locator)
            .copied()
            .unwrap_or(0)
    }

    /// Attempts made across all items.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of attempts observed running at once.
    #[must_use]
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn output_path(&self, item: &WorkItem) -> PathBuf {
        self.output_dir.join(format!("{}.bin", item.id()))
    }
}

/// Decrements the active counter even when the attempt is cancelled.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Processor for FileWritingProcessor {
    fn name(&self) -> &'static str {
        "file-writer"
    }

    async fn process(&self, item: &WorkItem) -> Result<Artifact, ProcessError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(item.source_locator().to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.always_fail.contains(item.source_locator()) {
            return Err(FetchError::http_status(item.source_locator(), 500).into());
        }
        if self
            .fail_first
            .get(item.source_locator())
            .is_some_and(|&failures| attempt <= failures)
        {
            return Err(FetchError::http_status(item.source_locator(), 503).into());
        }

        let path = self.output_path(item);
        let body = item.source_locator().as_bytes();
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ProcessError::storage(&path, e))?;
        Ok(Artifact {
            path,
            size_bytes: body.len() as u64,
        })
    }
}
