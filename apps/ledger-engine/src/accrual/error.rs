//! Accrual client error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from the accrual service client.
///
/// Workers branch on three cases: rate-limited (honor the suggested
/// backoff before the next poll), anything else (log and move on), or
/// success. Nothing here ever reaches a submitting caller.
#[derive(Debug, Clone, Error)]
pub enum AccrualError {
    /// The service asked us to slow down.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Pause mandated by the `Retry-After` header; zero when the
        /// header was absent or unparseable.
        retry_after: Duration,
    },

    /// Non-success response; retryable at the worker's discretion.
    #[error("unexpected accrual response: {status}")]
    Unexpected {
        /// HTTP status code.
        status: u16,
    },

    /// Request never completed.
    #[error("accrual transport error: {0}")]
    Transport(String),

    /// Response body could not be parsed.
    #[error("accrual decode error: {0}")]
    Decode(String),
}

impl AccrualError {
    /// Backoff the worker must sleep before its next poll.
    #[must_use]
    pub const fn suggested_backoff(&self) -> Duration {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_suggest_backoff() {
        let limited = AccrualError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(limited.suggested_backoff(), Duration::from_secs(30));
        assert_eq!(
            AccrualError::Unexpected { status: 500 }.suggested_backoff(),
            Duration::ZERO
        );
        assert_eq!(
            AccrualError::Transport("connection refused".to_string()).suggested_backoff(),
            Duration::ZERO
        );
    }
}
