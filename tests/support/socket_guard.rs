//! Mock HTTP servers for tests that may run where localhost cannot be bound.
//!
//! Sandboxed CI runners sometimes refuse `bind`; those tests are skipped
//! with a note on stderr. Setting `HARVESTER_REQUIRE_SOCKET_TESTS=1` turns
//! the skip into a failure so a runner that should have sockets cannot pass
//! silently.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_SOCKETS_ENV: &str = "HARVESTER_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_SOCKETS_ENV)
        .is_ok_and(|value| matches!(value.trim(), "1" | "true" | "yes"))
}

/// Starts a wiremock server, or returns `None` when localhost cannot be bound.
///
/// # Panics
///
/// Panics instead of returning `None` when `HARVESTER_REQUIRE_SOCKET_TESTS`
/// is set.
pub async fn mock_server() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }

    // libtest names each test thread after the test.
    let test = std::thread::current()
        .name()
        .unwrap_or("unnamed test")
        .to_string();
    assert!(
        !sockets_required(),
        "{test}: cannot bind 127.0.0.1 for the mock server and {REQUIRE_SOCKETS_ENV} is set"
    );
    eprintln!("{test}: skipped, cannot bind 127.0.0.1 for the mock server");
    None
}
