use std::time::Duration;
use thiserror::Error;

/// Errors raised by the gasless rate limiter.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The fixed window for this (owner, chain, flow) key is exhausted.
    #[error("gasless rate limit exceeded; retry in {}s", retry_after.as_secs())]
    Exceeded {
        /// Time until the window resets.
        retry_after: Duration,
    },
}
