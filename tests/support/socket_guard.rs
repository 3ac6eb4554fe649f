//! Skips socket-bound tests in sandboxes that forbid localhost listeners.
//!
//! Set `URL_DOWNLOADER_REQUIRE_SOCKET_TESTS=1` in CI to turn a skip into a
//! failure.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "URL_DOWNLOADER_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns true (after logging why) when no localhost socket can be bound.
///
/// # Panics
///
/// Panics instead of skipping when socket tests are required.
pub fn should_skip_socket_bound_test() -> bool {
    let Err(error) = TcpListener::bind("127.0.0.1:0") else {
        return false;
    };

    let test = std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_owned();
    if socket_tests_required() {
        panic!("{test}: localhost bind failed ({error}) and {REQUIRE_ENV} is set");
    }
    eprintln!("{test}: skipping, localhost bind failed ({error})");
    true
}

/// Starts a wiremock server, or returns `None` when sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        return None;
    }
    Some(MockServer::start().await)
}
