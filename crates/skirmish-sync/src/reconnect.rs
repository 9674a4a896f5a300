//! Reconnection backoff policy.
//!
//! Pure functions: no timers, no I/O. The channel's retry driver consults
//! this to schedule attempts and to decide when to give up.

use std::time::Duration;

use skirmish_core::constants::{RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_ATTEMPTS};

/// Exponential backoff with a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before the 1-based `attempt`: `base * 2^(attempt - 1)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, attempt)
    }

    /// Whether `attempt` (1-based) is still within `max_attempts`.
    pub fn has_attempts_remaining(attempt: u32, max_attempts: u32) -> bool {
        attempt <= max_attempts
    }

    /// [`Self::has_attempts_remaining`] against this policy's cap.
    pub fn allows(&self, attempt: u32) -> bool {
        Self::has_attempts_remaining(attempt, self.max_attempts)
    }
}

/// `base * 2^(attempt - 1)`, saturating at `Duration::MAX`. Attempt 0 is treated as 1.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.max(1) - 1;
    2u32.checked_pow(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}
