//! Shared HTTP client construction and error classification.

use std::time::Duration;

use reqwest::StatusCode;

const USER_AGENT: &str = concat!("grant-discovery/", env!("CARGO_PKG_VERSION"));

/// Builds the process-wide [`reqwest::Client`] shared by the search, scoring
/// and Supabase clients.
pub fn build_reqwest_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Rate limiting and server-side failures are worth another attempt.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Connection and timeout failures are worth another attempt; anything that
/// went wrong while building the request or decoding the body is not.
pub fn is_transient_transport(error: &reqwest::Error) -> bool {
    if error.is_builder() || error.is_decode() {
        return false;
    }
    if let Some(status) = error.status() {
        return is_transient_status(status);
    }
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}
