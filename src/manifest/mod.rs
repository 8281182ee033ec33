//! Manifest store: the pipeline's resume checkpoint.
//!
//! The store owns two files inside the output directory:
//!
//! - [`JOURNAL_FILE`] - append-only JSON lines, one per completed item.
//!   Every append is flushed and synced before it returns, so a record in
//!   the journal always means the output file was fully written.
//! - [`FAILURE_LIST_FILE`] - plain text, one `<locator>\t<stage>: <reason>`
//!   line per failed item. Failed items stay eligible for the next run and
//!   the file doubles as a retry worklist.
//!
//! On open with `resume = true`, the journal is parsed line by line into the
//! seen-ID set. Malformed lines (a torn last line from a crashed run, invalid
//! UTF-8, hand edits) are skipped, never fatal. The store takes an advisory
//! exclusive lock on the journal so only one run writes a checkpoint at a
//! time, and it is the single writer of both files within a run.

mod error;
mod record;

pub use error::JournalError;
pub use record::{FailureRecord, ManifestRecord};

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::item::WorkItem;
use crate::outcome::Outcome;

/// File name of the success journal inside the output directory.
pub const JOURNAL_FILE: &str = "manifest.jsonl";

/// File name of the failure list inside the output directory.
pub const FAILURE_LIST_FILE: &str = "failed.txt";

/// Append-only journal of completed items plus the failure list.
#[derive(Debug)]
pub struct ManifestStore {
    journal_path: PathBuf,
    failure_path: PathBuf,
    journal: File,
    failures: Option<File>,
    seen: HashSet<String>,
    skipped_lines: usize,
    failures_written: usize,
}

impl ManifestStore {
    /// Opens (creating if needed) the manifest files in `output_dir`.
    ///
    /// With `resume`, existing journal lines are loaded into the seen-ID
    /// set; without it the journal is left unread and new records are
    /// appended after the old ones.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Locked`] if another run holds the journal and
    /// [`JournalError::Io`] if the directory or journal cannot be opened.
    #[instrument(level = "debug", fields(output_dir = %output_dir.display()))]
    pub async fn open(output_dir: &Path, resume: bool) -> Result<Self, JournalError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| JournalError::io(output_dir, e))?;

        let journal_path = output_dir.join(JOURNAL_FILE);
        let failure_path = output_dir.join(FAILURE_LIST_FILE);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&journal_path)
            .await
            .map_err(|e| JournalError::io(&journal_path, e))?;
        let std_file = file.into_std().await;
        if let Err(e) = FileExt::try_lock_exclusive(&std_file) {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(JournalError::locked(&journal_path));
            }
            return Err(JournalError::io(&journal_path, e));
        }
        let mut journal = File::from_std(std_file);

        let mut seen = HashSet::new();
        let mut skipped_lines = 0;
        if resume {
            let mut bytes = Vec::new();
            journal
                .read_to_end(&mut bytes)
                .await
                .map_err(|e| JournalError::io(&journal_path, e))?;
            let scan = scan_journal(&bytes);
            seen = scan.seen;
            skipped_lines = scan.skipped_lines;
            if skipped_lines > 0 {
                warn!(
                    path = %journal_path.display(),
                    skipped_lines,
                    "skipped malformed journal lines"
                );
            }
        }

        repair_trailing_newline(&mut journal, &journal_path).await?;

        info!(
            path = %journal_path.display(),
            resume,
            completed = seen.len(),
            "manifest journal opened"
        );

        Ok(Self {
            journal_path,
            failure_path,
            journal,
            failures: None,
            seen,
            skipped_lines,
            failures_written: 0,
        })
    }

    /// Returns true iff a success record for `id` was loaded or written.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Number of distinct completed ids known to the store.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.seen.len()
    }

    /// Number of malformed journal lines skipped at load time.
    #[must_use]
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Number of failure lines appended during this run.
    #[must_use]
    pub fn failures_written(&self) -> usize {
        self.failures_written
    }

    /// Path of the success journal.
    #[must_use]
    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Path of the failure list.
    #[must_use]
    pub fn failure_list_path(&self) -> &Path {
        &self.failure_path
    }

    /// Records an outcome in the journal (success) or the failure list (failure).
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the append cannot be made durable.
    pub async fn record(&mut self, outcome: &Outcome) -> Result<(), JournalError> {
        if let Some(record) = ManifestRecord::from_outcome(outcome) {
            self.record_success(&record).await
        } else if let Some(record) = FailureRecord::from_outcome(outcome) {
            self.record_failure(&record).await
        } else {
            Ok(())
        }
    }

    /// Appends a success line and syncs it to disk before returning.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if encoding, writing, flushing or syncing fails.
    #[instrument(level = "debug", skip(self, record), fields(id = %record.id))]
    pub async fn record_success(&mut self, record: &ManifestRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record).map_err(|source| JournalError::Encode {
            id: record.id.clone(),
            source,
        })?;
        line.push(b'\n');

        self.journal
            .write_all(&line)
            .await
            .map_err(|e| JournalError::io(&self.journal_path, e))?;
        self.journal
            .flush()
            .await
            .map_err(|e| JournalError::io(&self.journal_path, e))?;
        self.journal
            .sync_data()
            .await
            .map_err(|e| JournalError::io(&self.journal_path, e))?;

        self.seen.insert(record.id.clone());
        debug!("journal record appended");
        Ok(())
    }

    /// Appends a failure line. The id stays eligible for later runs.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the failure list cannot be opened or written.
    #[instrument(level = "debug", skip(self, record), fields(source = %record.source_locator))]
    pub async fn record_failure(&mut self, record: &FailureRecord) -> Result<(), JournalError> {
        let failure_path = &self.failure_path;
        let file = match &mut self.failures {
            Some(file) => file,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(failure_path)
                    .await
                    .map_err(|e| JournalError::io(failure_path, e))?;
                self.failures.insert(file)
            }
        };

        file.write_all(record.to_line().as_bytes())
            .await
            .map_err(|e| JournalError::io(failure_path, e))?;
        file.flush()
            .await
            .map_err(|e| JournalError::io(failure_path, e))?;

        self.failures_written += 1;
        Ok(())
    }
}

/// Reads every valid record from a journal file, in append order.
///
/// A missing file yields an empty list.
///
/// # Errors
///
/// Returns [`JournalError::Io`] if the file exists but cannot be read.
pub async fn read_journal(path: &Path) -> Result<Vec<ManifestRecord>, JournalError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(JournalError::io(path, e)),
    };
    Ok(bytes
        .split(|b| *b == b'\n')
        .filter_map(ManifestRecord::parse_line)
        .collect())
}

/// Loads a failure list as work items, deduplicated by id in file order.
///
/// # Errors
///
/// Returns [`JournalError::Io`] if the file cannot be read.
pub async fn load_failure_list(path: &Path) -> Result<Vec<WorkItem>, JournalError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| JournalError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut seen = HashSet::new();
    let items = text
        .lines()
        .filter_map(FailureRecord::parse_line)
        .map(|record| WorkItem::new(record.source_locator))
        .filter(|item| seen.insert(item.id().to_string()))
        .collect();
    Ok(items)
}

struct JournalScan {
    seen: HashSet<String>,
    skipped_lines: usize,
}

fn scan_journal(bytes: &[u8]) -> JournalScan {
    let mut seen = HashSet::new();
    let mut skipped_lines = 0;
    for line in bytes.split(|b| *b == b'\n') {
        if line.trim_ascii().is_empty() {
            continue;
        }
        match ManifestRecord::parse_line(line) {
            Some(record) => {
                seen.insert(record.id);
            }
            None => skipped_lines += 1,
        }
    }
    JournalScan {
        seen,
        skipped_lines,
    }
}

/// Terminates a torn last line so the next append starts on a fresh line.
async fn repair_trailing_newline(journal: &mut File, path: &Path) -> Result<(), JournalError> {
    let len = journal
        .metadata()
        .await
        .map_err(|e| JournalError::io(path, e))?
        .len();
    if len == 0 {
        return Ok(());
    }

    journal
        .seek(SeekFrom::End(-1))
        .await
        .map_err(|e| JournalError::io(path, e))?;
    let mut last = [0u8; 1];
    journal
        .read_exact(&mut last)
        .await
        .map_err(|e| JournalError::io(path, e))?;

    if last[0] != b'\n' {
        debug!(path = %path.display(), "terminating torn journal line");
        journal
            .write_all(b"\n")
            .await
            .map_err(|e| JournalError::io(path, e))?;
        journal
            .flush()
            .await
            .map_err(|e| JournalError::io(path, e))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::outcome::FailureStage;
    use crate::process::Artifact;
    use tempfile::TempDir;

    fn success_for(locator: &str, dir: &Path) -> Outcome {
        let item = WorkItem::new(locator);
        let path = dir.join(format!("{}.png", item.id()));
        Outcome::success(
            &item,
            Artifact {
                path,
                size_bytes: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_open_creates_directory_and_empty_journal() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("nested/out");
        let store = ManifestStore::open(&out, true).await.unwrap();
        assert!(out.join(JOURNAL_FILE).exists());
        assert_eq!(store.completed_count(), 0);
        assert!(!store.has("anything"));
    }

    #[tokio::test]
    async fn test_record_success_marks_seen_and_persists() {
        let temp = TempDir::new().unwrap();
        let outcome = success_for("https://example.com/a.png", temp.path());
        {
            let mut store = ManifestStore::open(temp.path(), true).await.unwrap();
            store.record(&outcome).await.unwrap();
            assert!(store.has(outcome.id()));
        }

        let store = ManifestStore::open(temp.path(), true).await.unwrap();
        assert!(store.has(outcome.id()));
        let records = read_journal(&temp.path().join(JOURNAL_FILE)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, outcome.id());
    }

    #[tokio::test]
    async fn test_record_failure_does_not_mark_seen() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new("https://example.com/broken.png");
        let mut store = ManifestStore::open(temp.path(), true).await.unwrap();
        store
            .record(&Outcome::failure(&item, FailureStage::Fetch, "HTTP 500"))
            .await
            .unwrap();

        assert!(!store.has(item.id()));
        assert_eq!(store.failures_written(), 1);
        let text = std::fs::read_to_string(temp.path().join(FAILURE_LIST_FILE)).unwrap();
        assert_eq!(text, "https://example.com/broken.png\tfetch: HTTP 500\n");
    }

    #[tokio::test]
    async fn test_failure_list_not_created_without_failures() {
        let temp = TempDir::new().unwrap();
        let _store = ManifestStore::open(temp.path(), true).await.unwrap();
        assert!(!temp.path().join(FAILURE_LIST_FILE).exists());
    }

    #[tokio::test]
    async fn test_open_without_resume_ignores_existing_records() {
        let temp = TempDir::new().unwrap();
        let outcome = success_for("https://example.com/a.png", temp.path());
        {
            let mut store = ManifestStore::open(temp.path(), true).await.unwrap();
            store.record(&outcome).await.unwrap();
        }
        let store = ManifestStore::open(temp.path(), false).await.unwrap();
        assert!(!store.has(outcome.id()));
    }

    #[tokio::test]
    async fn test_truncated_last_line_is_skipped_and_repaired() {
        let temp = TempDir::new().unwrap();
        let first = success_for("https://example.com/1.png", temp.path());
        let second = success_for("https://example.com/2.png", temp.path());
        {
            let mut store = ManifestStore::open(temp.path(), true).await.unwrap();
            store.record(&first).await.unwrap();
            store.record(&second).await.unwrap();
        }
        let journal = temp.path().join(JOURNAL_FILE);
        let mut bytes = std::fs::read(&journal).unwrap();
        bytes.extend_from_slice(br#"{"id":"torn_000000000000","outputPa"#);
        std::fs::write(&journal, &bytes).unwrap();

        let third = success_for("https://example.com/3.png", temp.path());
        {
            let mut store = ManifestStore::open(temp.path(), true).await.unwrap();
            assert_eq!(store.skipped_lines(), 1);
            assert!(store.has(first.id()));
            assert!(store.has(second.id()));
            assert!(!store.has("torn_000000000000"));
            store.record(&third).await.unwrap();
        }

        let records = read_journal(&journal).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![first.id(), second.id(), third.id()]);
    }

    #[tokio::test]
    async fn test_second_open_is_locked_out() {
        let temp = TempDir::new().unwrap();
        let _held = ManifestStore::open(temp.path(), true).await.unwrap();
        let result = ManifestStore::open(temp.path(), true).await;
        assert!(matches!(result, Err(JournalError::Locked { .. })));
    }

    #[tokio::test]
    async fn test_load_failure_list_dedupes_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(FAILURE_LIST_FILE);
        std::fs::write(
            &path,
            "https://x/b.png\tfetch: HTTP 500\n\nhttps://x/a.png\ttimeout: 60s\nhttps://x/b.png\tfetch: HTTP 502\n",
        )
        .unwrap();

        let items = load_failure_list(&path).await.unwrap();
        let locators: Vec<&str> = items.iter().map(WorkItem::source_locator).collect();
        assert_eq!(locators, vec!["https://x/b.png", "https://x/a.png"]);
    }

    #[tokio::test]
    async fn test_read_journal_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let records = read_journal(&temp.path().join("missing.jsonl")).await.unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_scan_journal_counts_malformed_lines() {
        let bytes = b"{\"id\":\"a\",\"outputPath\":\"a.png\",\"timestamp\":1}\nnot json\n\n{\"id\":\"b\",\"outputPath\":\"b.png\",\"timestamp\":2}\n";
        let scan = scan_journal(bytes);
        assert_eq!(scan.seen.len(), 2);
        assert_eq!(scan.skipped_lines, 1);
    }
}
