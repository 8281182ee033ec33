//! Damaged manifest journals and unwritable checkpoint files.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use harvester_core::manifest::read_journal;
use harvester_core::{
    FAILURE_LIST_FILE, JournalError, ManifestStore, PipelineError, RunConfig, run_pipeline,
};
use tempfile::TempDir;

use crate::support::critical_utils::corrupted_journal;
use crate::support::fakes::{FileWritingProcessor, FixedSource, locator};

#[tokio::test]
async fn p0_corrupted_journal_loads_valid_records_only() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    corrupted_journal(&out, &[locator(0), locator(1)]);

    let store = ManifestStore::open(&out, true).await.expect("open store");

    assert_eq!(store.completed_count(), 2);
    assert_eq!(store.skipped_lines(), 4);
    assert!(store.has(harvester_core::WorkItem::new(locator(1)).id()));
}

#[tokio::test]
async fn p0_resume_over_corrupted_journal_skips_recorded_items() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let journal = corrupted_journal(&out, &[locator(0), locator(1)]);
    let config = RunConfig::new(&out);
    let processor = Arc::new(FileWritingProcessor::new(&out));

    let summary = run_pipeline(
        &config,
        Box::new(FixedSource::numbered(4)),
        processor.clone(),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("resume over damaged journal");

    assert_eq!(processor.calls_for(&locator(0)), 0);
    assert_eq!(processor.calls_for(&locator(1)), 0);
    assert_eq!(processor.calls_for(&locator(2)), 1);
    assert_eq!(processor.calls_for(&locator(3)), 1);
    assert_eq!(summary.skipped, 2);

    // New records start on their own line after the torn one.
    let records = read_journal(&journal).await.expect("read journal");
    assert_eq!(records.len(), 4);
    let text = String::from_utf8_lossy(&std::fs::read(&journal).expect("journal bytes"))
        .into_owned();
    assert!(text.contains("\"outputPa\n{"), "torn line not terminated: {text}");
}

#[tokio::test]
async fn p0_unwritable_failure_list_is_fatal() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    // A directory where the failure list should go makes every append fail.
    std::fs::create_dir_all(out.join(FAILURE_LIST_FILE)).expect("block failure list");
    let config = RunConfig::new(&out).with_retries(0, std::time::Duration::ZERO);
    let processor = Arc::new(FileWritingProcessor::new(&out).failing(locator(0)));

    let result = run_pipeline(
        &config,
        Box::new(FixedSource::numbered(1)),
        processor,
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await;

    assert!(
        matches!(result, Err(PipelineError::Journal(JournalError::Io { .. }))),
        "got {result:?}"
    );
}

#[tokio::test]
async fn p0_second_writer_is_refused_while_journal_is_locked() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let _holder = ManifestStore::open(&out, true).await.expect("first open");

    let result = run_pipeline(
        &RunConfig::new(&out),
        Box::new(FixedSource::numbered(1)),
        Arc::new(FileWritingProcessor::new(&out)),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await;

    assert!(
        matches!(result, Err(PipelineError::Journal(JournalError::Locked { .. }))),
        "got {result:?}"
    );
}

/// Reports success with an output path the journal cannot encode as JSON.
#[cfg(unix)]
struct UnencodablePathProcessor {
    dir: std::path::PathBuf,
}

#[cfg(unix)]
#[async_trait::async_trait]
impl harvester_core::Processor for UnencodablePathProcessor {
    fn name(&self) -> &'static str {
        "unencodable"
    }

    async fn process(
        &self,
        _item: &harvester_core::WorkItem,
    ) -> Result<harvester_core::Artifact, harvester_core::ProcessError> {
        use std::os::unix::ffi::OsStrExt;
        let name = std::ffi::OsStr::from_bytes(b"out\xFF.png");
        Ok(harvester_core::Artifact {
            path: self.dir.join(name),
            size_bytes: 1,
        })
    }
}

#[cfg(unix)]
#[tokio::test]
async fn p0_failed_success_append_is_fatal_and_records_nothing() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");

    let result = run_pipeline(
        &RunConfig::new(&out),
        Box::new(FixedSource::numbered(1)),
        Arc::new(UnencodablePathProcessor { dir: out.clone() }),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await;

    assert!(
        matches!(result, Err(PipelineError::Journal(JournalError::Encode { .. }))),
        "got {result:?}"
    );
    let records = read_journal(&out.join(harvester_core::JOURNAL_FILE))
        .await
        .expect("read journal");
    assert!(records.is_empty());
    assert!(!out.join(FAILURE_LIST_FILE).exists());
}
