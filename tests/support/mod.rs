//! Shared helpers for the integration test binaries.

#![allow(dead_code, unused_macros)]

/// Starts a mock server, or returns early from the calling test when
/// localhost cannot be bound.
macro_rules! mock_server_or_return {
    () => {
        match crate::support::socket_guard::mock_server().await {
            Some(server) => server,
            None => return,
        }
    };
}

pub mod critical_utils;
pub mod fakes;
pub mod socket_guard;
