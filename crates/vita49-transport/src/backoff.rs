use std::time::Duration;

/// Exponential delay between retries of a failing receive, doubling from
/// `initial` up to `max`. A successful receive resets it.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub const DEFAULT_INITIAL: Duration = Duration::from_millis(10);
    pub const DEFAULT_MAX: Duration = Duration::from_secs(10);

    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// Delay to wait before the next attempt.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL, Self::DEFAULT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = ExponentialBackoff::default();
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), ExponentialBackoff::DEFAULT_INITIAL);
    }

    #[test]
    fn initial_above_max_is_clamped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }
}
