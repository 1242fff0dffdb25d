//! Shared HTTP plumbing for the ATS adapters.
//!
//! One `reqwest::Client` with a total timeout is built at startup and cloned
//! into every adapter. Non-success statuses become `PollError::Transport`
//! carrying the parsed Retry-After; body decode failures are `Parse`, never
//! `Transport`.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use firstin_core::PollError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Build the HTTP client shared by every adapter and notifier.
pub fn build_client() -> Result<Client, PollError> {
    Client::builder()
        .user_agent(concat!("firstin/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| PollError::Network(e.to_string()))
}

/// Map a reqwest failure onto the error taxonomy.
pub(crate) fn map_request_error(e: reqwest::Error) -> PollError {
    if e.is_timeout() {
        PollError::Timeout(REQUEST_TIMEOUT_SECS)
    } else if e.is_connect() {
        PollError::Network(format!("connection failed: {e}"))
    } else {
        PollError::Network(e.to_string())
    }
}

/// Parse a Retry-After header value. Only the seconds format is supported;
/// absent or unparseable values yield `None`.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds: u64 = value.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Send a request and decode the JSON body, observing cancellation at both
/// the request and body reads. `what` names the call for error messages,
/// e.g. "greenhouse fetch for acme".
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    cancel: &CancellationToken,
    what: &str,
) -> Result<T, PollError> {
    let response = tokio::select! {
        result = request.send() => result.map_err(map_request_error)?,
        () = cancel.cancelled() => return Err(PollError::cancelled()),
    };

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers());
        return Err(PollError::Transport {
            status: status.as_u16(),
            retry_after,
            message: format!("{what}: unexpected status {}", status.as_u16()),
        });
    }

    let body = tokio::select! {
        result = response.text() => result.map_err(map_request_error)?,
        () = cancel.cancelled() => return Err(PollError::cancelled()),
    };

    serde_json::from_str(&body).map_err(|e| PollError::Parse(format!("{what}: {e}")))
}
