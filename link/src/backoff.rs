//! Exponential backoff shared by the retry and reconnect loops.

use std::time::Duration;

/// Initial delay between realtime reconnect attempts.
pub const REALTIME_MIN_BACKOFF: Duration = Duration::from_millis(200);

/// Upper bound for realtime reconnect delays.
pub const REALTIME_MAX_BACKOFF: Duration = Duration::from_millis(5000);

/// Doubling delay with a floor and a cap.
///
/// [`next_delay`](Backoff::next_delay) hands out the current delay and then
/// doubles it (saturating at `max`); [`reset`](Backoff::reset) goes back to
/// `min`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Backoff without a cap, for loops bounded by an attempt count instead.
    pub fn uncapped(min: Duration) -> Self {
        Self::new(min, Duration::MAX)
    }

    /// The realtime reconnect schedule: 200ms doubling up to 5s.
    pub fn realtime() -> Self {
        Self::new(REALTIME_MIN_BACKOFF, REALTIME_MAX_BACKOFF)
    }

    /// Delay to wait now; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Delay that the next call to `next_delay` will return.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
