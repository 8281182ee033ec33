//! Interrupts: admission stops, in-flight work is dropped unrecorded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use harvester_core::manifest::read_journal;
use harvester_core::{JOURNAL_FILE, RunConfig, run_pipeline};
use tempfile::TempDir;

use crate::support::fakes::{FileWritingProcessor, FixedSource};

#[tokio::test]
async fn p0_interrupt_before_start_processes_nothing() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let processor = Arc::new(FileWritingProcessor::new(&out));

    let summary = run_pipeline(
        &RunConfig::new(&out),
        Box::new(FixedSource::numbered(5)),
        processor.clone(),
        &Arc::new(AtomicBool::new(true)),
        |_| {},
    )
    .await
    .expect("interrupted run still returns a summary");

    assert!(summary.interrupted);
    assert_eq!(processor.total_calls(), 0);
    let records = read_journal(&out.join(JOURNAL_FILE)).await.expect("journal");
    assert!(records.is_empty());
}

#[tokio::test]
async fn p0_interrupt_mid_run_keeps_journal_consistent() {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let config = RunConfig::new(&out).with_concurrency(2);
    let processor =
        Arc::new(FileWritingProcessor::new(&out).with_delay(Duration::from_millis(50)));
    let interrupted = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&interrupted);
    let summary = run_pipeline(
        &config,
        Box::new(FixedSource::numbered(20)),
        processor.clone(),
        &interrupted,
        move |_| flag.store(true, Ordering::SeqCst),
    )
    .await
    .expect("interrupted run still returns a summary");

    assert!(summary.interrupted);
    assert!(summary.succeeded >= 1);
    assert!(summary.succeeded < 20, "interrupt should stop admission");
    assert!(processor.total_calls() < 20);

    let records = read_journal(&out.join(JOURNAL_FILE)).await.expect("journal");
    assert_eq!(records.len(), summary.succeeded);
    for record in &records {
        assert!(record.output_path.exists());
    }

    // The next run picks up exactly what was not journaled.
    let resumed = Arc::new(FileWritingProcessor::new(&out));
    let summary_after = run_pipeline(
        &config,
        Box::new(FixedSource::numbered(20)),
        resumed.clone(),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("resumed run");

    assert_eq!(summary_after.skipped, records.len());
    assert_eq!(resumed.total_calls(), 20 - records.len());
}
