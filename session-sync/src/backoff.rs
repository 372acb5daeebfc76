//! Reconnect delay policy for the connection monitor.

use std::time::Duration;

/// First wait after a lost connection.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Ceiling for the escalated wait.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Exponential backoff between reconnection attempts.
///
/// Each consumed wait doubles the next one up to the cap; a successful open
/// resets to the initial delay. There is no attempt limit — the monitor
/// retries until explicitly stopped.
#[derive(Debug, Clone)]
pub struct ReconnectDelay {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for ReconnectDelay {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY, MAX_RECONNECT_DELAY)
    }
}

impl ReconnectDelay {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The wait to use before the next attempt. Escalates the one after it.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = (self.current * 2).min(self.max);
        wait
    }

    /// Called on every successful open.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut delay = ReconnectDelay::default();
        let waits: Vec<u64> = (0..9).map(|_| delay.next_wait().as_millis() as u64).collect();
        assert_eq!(waits, [100, 200, 400, 800, 1600, 3200, 5000, 5000, 5000]);
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut delay = ReconnectDelay::default();
        for _ in 0..5 {
            delay.next_wait();
        }
        delay.reset();
        assert_eq!(delay.next_wait(), Duration::from_millis(100));
        assert_eq!(delay.next_wait(), Duration::from_millis(200));
    }

    #[test]
    fn custom_bounds() {
        let mut delay = ReconnectDelay::new(Duration::from_millis(10), Duration::from_millis(25));
        assert_eq!(delay.next_wait(), Duration::from_millis(10));
        assert_eq!(delay.next_wait(), Duration::from_millis(20));
        // 40ms exceeds the cap
        assert_eq!(delay.next_wait(), Duration::from_millis(25));
        assert_eq!(delay.next_wait(), Duration::from_millis(25));
    }
}
