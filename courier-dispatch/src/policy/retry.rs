//! Retry policy for failed sends.
//!
//! The retry counter travels inside the command itself; a failed send
//! republishes the command with `retry_count + 1` until `max_retries` is
//! reached.

use std::str::FromStr;

use courier_queue::MAX_DELAY_SECONDS;
use serde::Deserialize;

/// How the republish delay grows with the retry count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryBackoff {
    /// Always the base delay
    #[default]
    Fixed,
    /// `base * 2^retry_count`
    Exponential,
}

impl FromStr for RetryBackoff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!(
                "unknown retry backoff '{other}', expected fixed or exponential"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Highest `retry_count` a republished command may carry.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Visibility delay of a republished command (in seconds).
    ///
    /// Default: 0
    #[serde(default)]
    pub delay_seconds: u32,

    #[serde(default)]
    pub backoff: RetryBackoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            delay_seconds: 0,
            backoff: RetryBackoff::default(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a command that arrived with `retry_count` may be republished.
    #[must_use]
    pub const fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay for republishing a command that arrived with `retry_count`,
    /// capped at the queue maximum.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> u32 {
        let delay = match self.backoff {
            RetryBackoff::Fixed => u64::from(self.delay_seconds),
            RetryBackoff::Exponential => {
                u64::from(self.delay_seconds).saturating_mul(1u64 << retry_count.min(32))
            }
        };

        u32::try_from(delay.min(u64::from(MAX_DELAY_SECONDS))).unwrap_or(MAX_DELAY_SECONDS)
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        3
    }
}
