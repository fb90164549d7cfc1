//! HTTP plumbing shared by remote providers.

use std::time::Duration;

use reqwest::StatusCode;

use crate::error::LlmError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client with rustls, a `repolens/{version}` user-agent and at most 10
/// redirects. `request_timeout` bounds each request end to end.
#[must_use]
pub fn default_client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}

/// Map a non-success status to the matching [`LlmError`].
///
/// # Errors
///
/// Returns an error for every status outside 2xx.
pub fn error_for_status(
    provider: &str,
    status: StatusCode,
    endpoint: &str,
    body: &str,
) -> Result<(), LlmError> {
    if status.is_success() {
        return Ok(());
    }
    tracing::error!(provider, endpoint, %status, "API error: {body}");
    Err(match status.as_u16() {
        429 => LlmError::RateLimited,
        401 | 403 => LlmError::Auth {
            provider: provider.into(),
        },
        500..=599 => LlmError::Unavailable,
        code => LlmError::Api {
            provider: provider.into(),
            status: code,
        },
    })
}
