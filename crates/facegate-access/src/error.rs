//! Access control error types.

use thiserror::Error;

pub type AccessResult<T> = Result<T, AccessError>;

#[derive(Debug, Error)]
pub enum AccessError {
    /// The server has no secret configured.
    #[error("Server misconfigured: {0}")]
    ServerMisconfigured(String),

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Call limit exceeded: {count} of {limit} calls used")]
    QuotaExceeded { count: u64, limit: u64 },

    /// The counter store could not be reached. Requests are rejected, never
    /// admitted unmetered.
    #[error("Rate limiter unavailable: {0}")]
    RateLimiterUnavailable(String),
}

impl AccessError {
    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::ServerMisconfigured(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::RateLimiterUnavailable(msg.into())
    }
}

impl From<redis::RedisError> for AccessError {
    fn from(err: redis::RedisError) -> Self {
        Self::RateLimiterUnavailable(err.to_string())
    }
}
