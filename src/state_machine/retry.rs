use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Job-level retry budget and backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries before marking a job as failed.
    pub max_retries: u32,
    /// Base delay, multiplied by the retry number.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: None,
        }
    }

    /// Whether a job that has already used `retries` retries may try again.
    pub fn allows_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// Delay before redelivering retry number `attempt` (1-based).
    /// delay = base_delay * attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(attempt);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}
