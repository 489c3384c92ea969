//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff for polling loops.
//! The delay grows more slowly than exponential backoff, which keeps readiness
//! polls responsive for pods that come up a few seconds late without hammering
//! the API server for pods that take minutes.
//!
//! ## Usage
//!
//! ```rust
//! use echo_harness::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(Duration::from_millis(100), Duration::from_millis(500));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(200));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(300));
//! assert_eq!(backoff.next_delay(), Duration::from_millis(500));
//! ```

use std::time::Duration;

/// Smallest delay handed out; a zero start would never grow
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, starting at `min` and capped
/// at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum delay (for reset)
    min: Duration,
    /// Previous delay
    prev: Duration,
    /// Current delay
    current: Duration,
    /// Maximum delay
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given bounds
    ///
    /// `min` is at least one millisecond and `max` below `min` is raised
    /// to `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(MIN_DELAY);
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max: max.max(min),
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_delay(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);

        self.prev = self.current;
        self.current = next.min(self.max);

        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(ms(500), ms(5_000));

        // 500, 500, 1000, 1500, 2500, 4000, 5000 (max)
        assert_eq!(backoff.next_delay(), ms(500));
        assert_eq!(backoff.next_delay(), ms(500));
        assert_eq!(backoff.next_delay(), ms(1_000));
        assert_eq!(backoff.next_delay(), ms(1_500));
        assert_eq!(backoff.next_delay(), ms(2_500));
        assert_eq!(backoff.next_delay(), ms(4_000));
        assert_eq!(backoff.next_delay(), ms(5_000));
        // Next would be 6500 but stays capped
        assert_eq!(backoff.next_delay(), ms(5_000));
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(ms(100), ms(1_000));

        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.next_delay(), ms(100));
        assert_eq!(backoff.next_delay(), ms(100));
        assert_eq!(backoff.next_delay(), ms(200));
    }

    #[test]
    fn test_max_below_min_is_raised() {
        let mut backoff = FibonacciBackoff::new(ms(300), ms(100));
        assert_eq!(backoff.next_delay(), ms(300));
        assert_eq!(backoff.next_delay(), ms(300));
        assert_eq!(backoff.next_delay(), ms(300));
    }

    #[test]
    fn test_zero_min_still_grows() {
        let mut backoff = FibonacciBackoff::new(Duration::ZERO, ms(10));
        assert_eq!(backoff.next_delay(), ms(1));
        assert_eq!(backoff.next_delay(), ms(1));
        assert_eq!(backoff.next_delay(), ms(2));
        assert_eq!(backoff.next_delay(), ms(3));
    }
}
