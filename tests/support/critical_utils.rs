//! Shared utilities for critical tests (corrupted journals, flaky image hosts).
//!
//! Used by tests under `tests/critical/` to plant damaged manifest journals
//! and to serve images that fail a set number of times before succeeding.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use harvester_core::{JOURNAL_FILE, ManifestRecord};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

use super::socket_guard::mock_server;

/// Writes a journal into `output_dir` holding valid records for `locators`,
/// interleaved with damage a crashed or hand-edited run leaves behind:
/// a garbage line, a line of invalid UTF-8, a record missing required
/// fields, and a torn final line without a newline.
///
/// Returns the journal path.
pub fn corrupted_journal(output_dir: &Path, locators: &[String]) -> PathBuf {
    std::fs::create_dir_all(output_dir).expect("Failed to create output dir");
    let journal_path = output_dir.join(JOURNAL_FILE);

    let mut bytes = Vec::new();
    for (n, locator) in locators.iter().enumerate() {
        let item = harvester_core::WorkItem::new(locator);
        let record = ManifestRecord {
            id: item.id().to_string(),
            source: locator.clone(),
            output_path: output_dir.join(format!("{}.bin", item.id())),
            size_bytes: locator.len() as u64,
            timestamp: 1_700_000_000_000 + n as u64,
        };
        bytes.extend(serde_json::to_vec(&record).expect("encode record"));
        bytes.push(b'\n');
        if n == 0 {
            bytes.extend_from_slice(b"this is not json\n");
            bytes.extend_from_slice(b"\xff\xfe\xfd{\"id\":\"bad\"}\n");
            bytes.extend_from_slice(b"{\"source\":\"https://x/missing-id.png\"}\n");
        }
    }
    bytes.extend_from_slice(b"{\"id\":\"torn\",\"outputPa");

    std::fs::write(&journal_path, bytes).expect("Failed to write corrupted journal");
    journal_path
}

struct FlakyResponder {
    request_count: Arc<AtomicUsize>,
    fail_count: usize,
    success_body: Vec<u8>,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(503).set_body_bytes(b"service unavailable")
        } else {
            ResponseTemplate::new(200)
                .set_body_bytes(self.success_body.clone())
                .insert_header("Content-Type", "image/png")
        }
    }
}

/// Flaky image host: `/img/flaky.png` fails `fail_count` times with 503,
/// then returns 200 with `success_body`.
///
/// Returns the server and a counter of requests it received, or `None`
/// when no socket is available.
pub async fn flaky_network_mock(
    fail_count: usize,
    success_body: Vec<u8>,
) -> Option<(MockServer, Arc<AtomicUsize>)> {
    let mock_server = mock_server().await?;
    let request_count = Arc::new(AtomicUsize::new(0));

    Mock::given(method("GET"))
        .and(path("/img/flaky.png"))
        .respond_with(FlakyResponder {
            request_count: Arc::clone(&request_count),
            fail_count,
            success_body,
        })
        .mount(&mock_server)
        .await;

    Some((mock_server, request_count))
}
