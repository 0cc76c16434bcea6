//! Retry policy: decides what happens after a failed attempt.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::QueueConfig;
use crate::domain::Job;

/// Outcome of [`RetryPolicy::decide`] for a job whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to pending; run another pass after `delay`.
    Retry { delay: Duration },
    /// The job's own retry budget is spent.
    Exhausted,
    /// The session-wide retry cap was hit.
    SessionLimit,
}

/// Retry policy for failed jobs.
///
/// Exponential backoff: delay = base_delay * 2^(retry_count - 1), capped at
/// max_delay.
///
/// Example with base_delay=1s, max_delay=60s:
/// - retry 1: 1s
/// - retry 2: 2s
/// - retry 3: 4s
/// - retry 7: 60s (64s capped)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,

    /// Retries allowed across all jobs before the queue stops retrying.
    pub max_session_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(60_000),
            max_session_retries: 50,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_session_retries: config.max_session_retries,
        }
    }

    /// Delay before the next pass, given the job's updated `retry_count`
    /// (1-indexed).
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exp = retry_count.saturating_sub(1);
        let delay = 2u32
            .checked_pow(exp)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// Decide the fate of `job` after a failure was recorded on it.
    ///
    /// Counts against the session budget only when the job itself still has
    /// retries left.
    pub fn decide(&self, job: &Job, session: &SessionRetries) -> RetryDecision {
        if job.retries_exhausted() {
            return RetryDecision::Exhausted;
        }
        if session.record() >= self.max_session_retries {
            return RetryDecision::SessionLimit;
        }
        RetryDecision::Retry {
            delay: self.next_delay(job.retry_count),
        }
    }
}

/// Session-wide retry counter (circuit breaker).
///
/// Lives in memory only. Reset when a pass drains the queue or on
/// `retry_failed`.
#[derive(Debug, Default)]
pub struct SessionRetries(AtomicU32);

impl SessionRetries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Count one retry and return the new total.
    pub fn record(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    pub fn is_tripped(&self, cap: u32) -> bool {
        self.get() >= cap
    }
}
