mod client;
mod dedup;

pub use client::{RemoteClient, RetryPolicy};
pub use dedup::Deduplicator;

use serde_json::Value;
use thiserror::Error;

/// Error raised when a remote record-store call fails after exhausting its
/// retry budget (or immediately, for non-retryable rejections).
///
/// Clone-able so a deduplicated in-flight request can fan the same failure
/// out to every waiter.
#[derive(Debug, Clone, Error)]
#[error("remote api error: {message}")]
pub struct RemoteError {
    /// HTTP status of the last response, if one was received at all.
    pub status: Option<u16>,
    pub message: String,
    /// Response body of the last failed attempt, when it parsed as JSON.
    pub details: Option<Value>,
    pub url: String,
}

impl RemoteError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            details: None,
            url: url.into(),
        }
    }

    /// Transient failures (network, timeout, 5xx, 429) warrant retries and
    /// surface as 503; anything else is a rejection by the remote store.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 429 || (500..600).contains(&status),
        }
    }
}
