//! Error types for tallyd.
//!
//! These are infrastructure errors. Bad commands never show up here; they
//! are absorbed into the error tally by the state machine.

use thiserror::Error;

/// tallyd error type.
#[derive(Error, Debug)]
pub enum TallydError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// HTTP error talking to the session issuer
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected reply shape from Redis
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session issuer answered with something other than a token or a rejection
    #[error("Session issuer error: {0}")]
    Session(String),

    /// Publish did not complete in time
    #[error("Publish timed out after {0} ms")]
    PublishTimeout(u64),

    /// Publish worker is gone or its queue is full
    #[error("Publish queue unavailable: {0}")]
    PublishQueue(String),
}

/// Result type for tallyd operations.
pub type TallydResult<T> = Result<T, TallydError>;
