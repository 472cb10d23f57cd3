//! HTTP plumbing shared by the provider clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use siteforge_core::StageFailure;
use siteforge_shared::{Result, SiteForgeError};

const USER_AGENT: &str = concat!("siteforge/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest error body echoed back into a failure message.
const MAX_ERROR_BODY: usize = 300;

pub(crate) fn build_client(request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .use_rustls_tls()
        .build()
        .map_err(|e| SiteForgeError::Network(format!("failed to build HTTP client: {e}")))
}

/// Classify a transport-level error.
pub(crate) fn failure_for_error(provider: &str, err: &reqwest::Error) -> StageFailure {
    if err.is_timeout() {
        StageFailure::timeout(format!("{provider} request timed out"))
    } else {
        StageFailure::transient(format!("{provider} request failed: {err}"))
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn failure_for_status(provider: &str, status: StatusCode, body: &str) -> StageFailure {
    let body = truncate(body.trim(), MAX_ERROR_BODY);
    let message = if body.is_empty() {
        format!("{provider} returned HTTP {status}")
    } else {
        format!("{provider} returned HTTP {status}: {body}")
    };

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => {
            StageFailure::transient(message)
        }
        s if s.is_server_error() => StageFailure::transient(message),
        _ => StageFailure::rejected(message),
    }
}

/// Pass successful responses through; turn everything else into a classified failure.
pub(crate) async fn check_status(
    provider: &str,
    response: Response,
) -> std::result::Result<Response, StageFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(provider, status = status.as_u16(), "provider returned an error status");
    Err(failure_for_status(provider, status, &body))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
