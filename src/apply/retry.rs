use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::time::Instant;

/// Bounded exponential backoff for transient failures
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Including the first attempt
    pub max_attempts: u32,
    /// Overall budget, measured from the first attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn start(&self) -> PendingRetry {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: Some(self.timeout),
            ..ExponentialBackoff::default()
        };
        backoff.reset();
        PendingRetry {
            attempt: 1,
            max_attempts: self.max_attempts,
            deadline: Instant::now() + self.timeout,
            backoff,
        }
    }
}

/// Retry state of a single operation
pub struct PendingRetry {
    attempt: u32,
    max_attempts: u32,
    deadline: Instant,
    backoff: ExponentialBackoff,
}

impl PendingRetry {
    /// Number of the attempt currently in flight, starting from 1
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before next attempt, `None` once attempts or time budget are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        let delay = self.backoff.next_backoff()?.min(remaining);
        self.attempt += 1;
        Some(delay)
    }
}
