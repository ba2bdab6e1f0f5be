//! Linear reconnect backoff.

use std::time::Duration;

/// Delay schedule for reconnect attempts: `base`, `2·base`, `3·base`, …
/// never exceeding `ceiling`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    attempt: u32,
}

impl Backoff {
    /// Starts a schedule whose first delay is `base`.
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling,
            attempt: 0,
        }
    }

    /// Number of delays handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The delay before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(self.attempt).min(self.ceiling)
    }

    /// Sleeps for [`next_delay`](Self::next_delay).
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.next_delay()).await;
    }

    /// Starts the schedule over at `base`, e.g. after a successful login.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
