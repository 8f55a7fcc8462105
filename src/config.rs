//! Engine configuration.

use std::time::Duration;

/// Bounded retry policy for file-presence checks.
///
/// Tolerates transient filesystem latency between a write and a subsequent
/// read within the same batch. It is not a concurrency mechanism; the engine
/// assumes a single writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits, for tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay to sleep after the given failed attempt (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run `check` up to `max_attempts` times, sleeping between attempts,
    /// until it returns true.
    pub fn wait_until(&self, mut check: impl FnMut() -> bool) -> bool {
        for attempt in 0..self.max_attempts {
            if check() {
                return true;
            }
            if attempt + 1 < self.max_attempts {
                std::thread::sleep(self.backoff(attempt));
            }
        }
        false
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry policy injected into the file store.
    pub retry: RetryPolicy,
    /// Default for `BatchRequest` options when the request leaves it unset.
    pub stop_on_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            stop_on_error: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stop a batch at the first failed operation.
    pub fn stop_on_error(mut self) -> Self {
        self.stop_on_error = true;
        self
    }
}
