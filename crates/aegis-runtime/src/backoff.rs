//! Retry delay computation.

use aegis_core::ErrorKind;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with a cap and optional jitter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Multiplier applied per additional attempt; at least 1.0.
    pub growth: f64,
    /// Upper bound on the computed delay (before jitter).
    pub cap: Duration,
    /// Adds a uniform random delay in `[0, 1 s)` when set.
    pub jitter: bool,
}

impl BackoffPolicy {
    /// Delay to sleep after the given 1-based failed attempt.
    ///
    /// Rate-limited failures double the base so the caller backs off the
    /// way the remote asked.
    pub fn delay_for(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let base = if kind == ErrorKind::RateLimited {
            self.base.as_secs_f64() * 2.0
        } else {
            self.base.as_secs_f64()
        };

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = base * self.growth.powi(exponent);
        // min() falls back to the cap when growth overflowed to inf/NaN.
        let mut delay = Duration::from_secs_f64(raw.min(self.cap.as_secs_f64()));

        if self.jitter {
            let jitter = rand::rng().random_range(0.0..1.0);
            delay += Duration::from_secs_f64(jitter);
        }
        delay
    }
}
