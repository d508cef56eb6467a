//! Capped exponential reconnect backoff.

use core::time::Duration;

use rand::Rng as _;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    /// Delay before the next attempt, then doubles the step up to the cap.
    pub fn next_delay(&mut self, jitter: Duration) -> Duration {
        let step = self.current.min(self.cap);
        self.current = self.current.saturating_mul(2).min(self.cap);
        step + jitter
    }

    /// Back to the base step after a successful connect.
    pub const fn reset(&mut self) {
        self.current = self.base;
    }

    /// Uniform jitter in `[0, 1)` seconds.
    #[must_use]
    pub fn jitter() -> Duration {
        Duration::from_secs_f64(rand::rng().random_range(0.0..1.0))
    }
}
