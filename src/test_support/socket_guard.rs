//! Localhost socket probe for unit tests that need a mock server.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "URL_DOWNLOADER_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a wiremock server, or returns `None` (after logging) when the
/// sandbox forbids binding localhost.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if let Err(error) = TcpListener::bind("127.0.0.1:0") {
        let test = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_owned();
        assert!(
            !socket_tests_required(),
            "{test}: localhost bind failed ({error}) and {REQUIRE_ENV} is set"
        );
        eprintln!("{test}: skipping, localhost bind failed ({error})");
        return None;
    }
    Some(MockServer::start().await)
}
