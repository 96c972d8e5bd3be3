//! # Delivery Backoff
//!
//! Retry delay for a failed delivery, as a pure function of how many attempts
//! the entry has already used.
//!
//! ```text
//! delay(attempts) = min(base * 2^attempts, max)
//!
//! base = 1s, max = 8s:
//!   attempts  0   1   2   3   4   5 ...
//!   delay     1s  2s  4s  8s  8s  8s
//! ```
//!
//! No jitter is applied; the schedule is fully deterministic.

use std::time::Duration;

/// Exponential backoff parameters for queued deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Creates a policy. A `max` below `base` is raised to `base`.
    pub fn new(base: Duration, max: Duration) -> Self {
        BackoffPolicy {
            base,
            max: max.max(base),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before the next attempt of an entry that has failed `attempts`
    /// times so far.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        1u32.checked_shl(attempts)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}
