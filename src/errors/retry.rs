use std::time::Duration;

/// Crash-retry budget for a single payload.
///
/// A payload gets `max_attempts` runs in total. Between attempts the worker
/// waits `backoff` times the attempt number plus up to 250ms of jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before the next attempt, `attempt` being the 1-based number of
    /// the attempt that just failed.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let jitter_ms: u64 = rand::random::<u64>() % 250;
        self.backoff * attempt.max(1) + Duration::from_millis(jitter_ms)
    }

    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
