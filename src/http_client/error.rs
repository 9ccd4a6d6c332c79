//! Fetch error types.

use thiserror::Error;

use crate::challenge::ChallengeError;
use crate::rate_limit::RateLimitError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request cancelled")]
    Cancelled,
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Challenge handling failed: {0}")]
    Challenge(ChallengeError),
    #[error("Rate limiter misconfigured: {0}")]
    RateLimit(String),
    #[error("Client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    /// Cancellation must always reach the caller; everything else may be
    /// degraded into an empty result.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl From<RateLimitError> for FetchError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Cancelled => FetchError::Cancelled,
            RateLimitError::InvalidPolicy(msg) => FetchError::RateLimit(msg),
        }
    }
}

impl From<ChallengeError> for FetchError {
    fn from(e: ChallengeError) -> Self {
        match e {
            ChallengeError::Cancelled => FetchError::Cancelled,
            other => FetchError::Challenge(other),
        }
    }
}
