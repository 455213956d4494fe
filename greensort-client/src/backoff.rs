//! Reconnect delay schedule

use std::time::Duration;

/// Exponential reconnect delay: the Nth consecutive failure waits
/// `min(base * 2^(N-1), cap)`
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    cap: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempts: 0,
        }
    }

    pub fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
    }

    /// Delay for the given 1-based attempt number
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.delay_for(self.attempts)
    }

    /// Called after a successful open
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failures since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
