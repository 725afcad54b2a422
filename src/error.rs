//! Error types for the Concierge service.

use thiserror::Error;

use crate::guardrail::RateLimitReason;
use crate::provider::ProviderError;

/// Main error type for Concierge operations.
#[derive(Error, Debug)]
pub enum ConciergeError {
    /// The message was empty after sanitizing
    #[error("Empty message")]
    EmptyInput,

    /// The client exceeded one of the rate limit criteria
    #[error("Rate limited: {0}")]
    RateLimited(RateLimitReason),

    /// The message matched the injection / off-topic denylist
    #[error("Policy violation")]
    PolicyViolation,

    /// Upstream provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Concierge operations.
pub type Result<T> = std::result::Result<T, ConciergeError>;
