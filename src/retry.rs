//! Capped exponential backoff shared by the batch flusher and the sink dispatcher.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay after the `attempt`-th failure (1-based): `min(base * 2^(attempt-1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// [`delay`](Self::delay) plus up to 25% random jitter.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let d = self.delay(attempt);
        let spread = d.as_millis() as u64 / 4;
        if spread == 0 {
            return d;
        }
        d + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}
