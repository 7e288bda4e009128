//! Configuration for tallyd.

use crate::error::{TallydError, TallydResult};
use std::time::Duration;
use tally_core::OverflowPolicy;

/// Default inbound stream key.
pub const DEFAULT_QUEUE: &str = "tally:commands";

/// Default pub/sub channel for reports.
pub const DEFAULT_TOPIC: &str = "tally:reports";

/// Default account used to request a session.
pub const DEFAULT_ACCOUNT: &str = "tally-default";

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Retry behaviour for session establishment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// tallyd configuration.
#[derive(Debug, Clone)]
pub struct TallyConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Stream key commands are read from
    pub queue: String,

    /// Channel reports are published to
    pub topic: String,

    /// Account identifier sent to the session issuer
    pub account_id: String,

    /// Base URL of a remote session issuer; `None` uses the local issuer
    pub session_url: Option<String>,

    /// Account accepted by the local issuer
    pub registered_account: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Consumer name (unique per instance)
    pub consumer_name: String,

    /// XREADGROUP block timeout in milliseconds
    pub block_timeout_ms: u64,

    /// Upper bound for a single publish
    pub publish_timeout: Duration,

    /// Reports buffered for the publish worker before new ones are dropped
    pub publish_queue_capacity: usize,

    /// Startup retry policy for session issuance
    pub session_retry: RetryPolicy,

    /// Counter behaviour at the edges of the i32 range
    pub overflow: OverflowPolicy,
}

impl TallyConfig {
    /// Create a config for the given account, reading overrides from the
    /// process environment.
    pub fn new(account_id: String) -> TallydResult<Self> {
        Self::from_lookup(account_id, |key| std::env::var(key).ok())
    }

    /// Create a config using `lookup` in place of the environment.
    pub fn from_lookup<F>(account_id: String, lookup: F) -> TallydResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if account_id.trim().is_empty() {
            return Err(TallydError::Config("account id must not be empty".into()));
        }

        let parsed = |key: &str, default: u64| -> TallydResult<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| TallydError::Config(format!("{} must be an integer, got {:?}", key, raw))),
                None => Ok(default),
            }
        };

        let overflow = match lookup("TALLY_OVERFLOW") {
            Some(raw) => raw.parse().map_err(TallydError::Config)?,
            None => OverflowPolicy::default(),
        };

        let session_retry = RetryPolicy {
            max_attempts: parsed("TALLY_SESSION_ATTEMPTS", 3)?.clamp(1, u32::MAX as u64) as u32,
            ..RetryPolicy::default()
        };

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            queue: lookup("TALLY_QUEUE").unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            topic: lookup("TALLY_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            account_id,
            session_url: lookup("TALLY_SESSION_URL").filter(|url| !url.trim().is_empty()),
            registered_account: lookup("TALLY_REGISTERED_ACCOUNT")
                .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            consumer_group: "tallyd".to_string(),
            consumer_name: format!("tallyd-{}", uuid::Uuid::new_v4()),
            block_timeout_ms: parsed("TALLY_BLOCK_MS", 5000)?,
            publish_timeout: Duration::from_millis(parsed("TALLY_PUBLISH_TIMEOUT_MS", 2000)?),
            publish_queue_capacity: 256,
            session_retry,
            overflow,
        })
    }
}
