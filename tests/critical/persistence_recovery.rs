//! Recovery after crashed or partially failed runs.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use harvester_core::manifest::read_journal;
use harvester_core::process::storage::partial_path;
use harvester_core::{
    DirectorySource, DownloadProcessor, FAILURE_LIST_FILE, FailureListSource, HttpClient,
    JOURNAL_FILE, RunConfig, WorkItem, run_pipeline,
};
use tempfile::TempDir;

use crate::support::fakes::{FileWritingProcessor, FixedSource, locator};

#[tokio::test]
async fn p0_output_without_journal_record_is_redone() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    std::fs::create_dir_all(&out).expect("out dir");

    // Crash after the file was written but before it was journaled.
    let item = WorkItem::new(locator(0));
    let orphan = out.join(format!("{}.bin", item.id()));
    std::fs::write(&orphan, b"half").expect("orphan output");

    let processor = Arc::new(FileWritingProcessor::new(&out));
    let summary = run_pipeline(
        &RunConfig::new(&out),
        Box::new(FixedSource::numbered(1)),
        processor.clone(),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("run");

    assert_eq!(processor.calls_for(&locator(0)), 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(
        std::fs::read(&orphan).expect("output"),
        locator(0).as_bytes()
    );
}

#[tokio::test]
async fn p0_stale_partial_file_is_replaced() {
    let temp = TempDir::new().expect("temp dir");
    let input = temp.path().join("in");
    let out = temp.path().join("out");
    std::fs::create_dir_all(&input).expect("in dir");
    std::fs::create_dir_all(&out).expect("out dir");

    let source = input.join("pig.jpg");
    std::fs::write(&source, b"complete jpeg").expect("source image");
    let item = WorkItem::new(source.to_string_lossy());
    let final_path = out.join(format!("{}.jpg", item.id()));
    std::fs::write(partial_path(&final_path), b"torn").expect("stale partial");

    let processor = DownloadProcessor::new(HttpClient::new().expect("client"), &out);
    let summary = run_pipeline(
        &RunConfig::new(&out),
        Box::new(DirectorySource::new(&input)),
        Arc::new(processor),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("run");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(std::fs::read(&final_path).expect("output"), b"complete jpeg");
    assert!(!partial_path(&final_path).exists());

    let records = read_journal(&out.join(JOURNAL_FILE)).await.expect("journal");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].output_path, final_path);
    assert_eq!(records[0].size_bytes, 13);
}

#[tokio::test]
async fn p0_failure_list_feeds_a_retry_run() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let config = RunConfig::new(&out).with_retries(0, Duration::ZERO);

    let first = Arc::new(
        FileWritingProcessor::new(&out)
            .failing(locator(1))
            .failing(locator(4)),
    );
    let summary = run_pipeline(
        &config,
        Box::new(FixedSource::numbered(6)),
        first,
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("first run");
    assert_eq!(summary.failed, 2);

    let retry = Arc::new(FileWritingProcessor::new(&out));
    let summary = run_pipeline(
        &config,
        Box::new(FailureListSource::new(out.join(FAILURE_LIST_FILE))),
        retry.clone(),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("retry run");

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(retry.total_calls(), 2);
    assert_eq!(retry.calls_for(&locator(1)), 1);
    assert_eq!(retry.calls_for(&locator(4)), 1);

    let records = read_journal(&out.join(JOURNAL_FILE)).await.expect("journal");
    assert_eq!(records.len(), 6);
}
