//! Unreliable image hosts: transient errors, permanent errors, stalls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use harvester_core::{
    DownloadProcessor, FAILURE_LIST_FILE, HttpClient, RunConfig, WorkItem, run_pipeline,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::support::critical_utils::flaky_network_mock;
use crate::support::fakes::FixedSource;

fn download_processor(out: &std::path::Path) -> Arc<DownloadProcessor> {
    Arc::new(DownloadProcessor::new(
        HttpClient::new().expect("client"),
        out,
    ))
}

#[tokio::test]
async fn p0_transient_errors_recover_within_retry_budget() {
    let Some((mock_server, requests)) = flaky_network_mock(2, b"PNGDATA".to_vec()).await else {
        return;
    };
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let url = format!("{}/img/flaky.png", mock_server.uri());

    let summary = run_pipeline(
        &RunConfig::new(&out).with_retries(2, Duration::from_millis(10)),
        Box::new(FixedSource::new(vec![url.clone()])),
        download_processor(&out),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("run");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.retried, 2);
    assert_eq!(requests.load(Ordering::SeqCst), 3);
    let id = WorkItem::new(&url).id().to_string();
    assert_eq!(
        std::fs::read(out.join(format!("{id}.png"))).expect("output"),
        b"PNGDATA"
    );
}

#[tokio::test]
async fn p0_permanent_error_exhausts_retries_then_lands_in_failure_list() {
    let mock_server = mock_server_or_return!();
    Mock::given(method("GET"))
        .and(path("/img/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&mock_server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let url = format!("{}/img/gone.png", mock_server.uri());

    let summary = run_pipeline(
        &RunConfig::new(&out).with_retries(2, Duration::ZERO),
        Box::new(FixedSource::new(vec![url.clone()])),
        download_processor(&out),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("run");

    assert_eq!(summary.failed, 1);
    let failures = std::fs::read_to_string(out.join(FAILURE_LIST_FILE)).expect("failure list");
    assert_eq!(failures, format!("{url}\tfetch: HTTP 404 fetching {url}\n"));
    let leftovers: Vec<_> = std::fs::read_dir(&out)
        .expect("out dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn p0_stalled_host_fails_with_timeout_stage() {
    let mock_server = mock_server_or_return!();
    Mock::given(method("GET"))
        .and(path("/img/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("out");
    let url = format!("{}/img/slow.png", mock_server.uri());

    let summary = run_pipeline(
        &RunConfig::new(&out)
            .with_retries(0, Duration::ZERO)
            .with_timeout(Duration::from_millis(200)),
        Box::new(FixedSource::new(vec![url.clone()])),
        download_processor(&out),
        &Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .expect("run");

    assert_eq!(summary.failed, 1);
    let failures = std::fs::read_to_string(out.join(FAILURE_LIST_FILE)).expect("failure list");
    assert!(failures.contains("\ttimeout: "), "got {failures}");
}
