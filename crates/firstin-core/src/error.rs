use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for FirstIn.
#[derive(Error, Debug)]
pub enum PollError {
    /// Upstream returned a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Transport {
        status: u16,
        /// Server-requested delay from a Retry-After header, if present.
        retry_after: Option<Duration>,
        message: String,
    },

    /// Network/connection error (DNS, refused, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Response body did not decode or had an unexpected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid configuration. Fatal at startup only.
    #[error("config error: {0}")]
    Config(String),

    /// Seen-set store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// Notification delivery failed.
    #[error("notifier error: {0}")]
    Notify(String),

    /// Operation was cancelled by shutdown. Unwinds cleanly, never logged as an error.
    #[error("cancelled")]
    Cancelled {
        /// Latest transient failure when cancellation interrupted a retry backoff.
        #[source]
        cause: Option<Box<PollError>>,
    },

    /// A poll-cycle error wrapped with the company and pipeline step it came from.
    #[error("polling {company}: {step}: {source}")]
    Context {
        company: String,
        step: &'static str,
        #[source]
        source: Box<PollError>,
    },
}

impl PollError {
    /// A plain cancellation with no underlying cause.
    pub fn cancelled() -> PollError {
        PollError::Cancelled { cause: None }
    }

    /// A cancellation that interrupted a retry backoff, keeping the
    /// transient failure that was being retried.
    pub fn cancelled_after(cause: PollError) -> PollError {
        PollError::Cancelled {
            cause: Some(Box::new(cause)),
        }
    }

    /// Returns true if this error is transient and worth retrying.
    ///
    /// Transport errors are retryable on 429 and 5xx only; other 4xx
    /// statuses, parse failures, and cancellation are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            PollError::Network(_) | PollError::Timeout(_) => true,
            PollError::Transport { status, .. } => *status == 429 || *status >= 500,
            PollError::Context { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The server-requested retry delay, if the upstream sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PollError::Transport { retry_after, .. } => *retry_after,
            PollError::Context { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// True when the error is (or wraps) a shutdown cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PollError::Cancelled { .. } => true,
            PollError::Context { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Wrap this error with the company and pipeline step it occurred in.
    pub fn in_step(self, company: &str, step: &'static str) -> PollError {
        PollError::Context {
            company: company.to_string(),
            step,
            source: Box::new(self),
        }
    }
}
