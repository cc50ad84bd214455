//! # Exponential Backoff
//!
//! Provides a doubling backoff mechanism for reconciliation retries.
//!
//! The first failure after a success (or with no history) waits `base`.
//! Every further consecutive failure doubles the previous interval until it
//! reaches `cap`, where it stays. The interval never becomes "never retry".
//!
//! ## Usage
//!
//! ```rust
//! use declaration_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Can be used statelessly via [`ExponentialBackoff::delay_for`] (the failure
/// count is persisted on the resource status) or statefully via
/// [`ExponentialBackoff::next_backoff`] for in-process retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Interval after the first failure of a sequence
    base: Duration,
    /// Maximum interval
    cap: Duration,
    /// Consecutive failures seen by the stateful API
    failures: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with the given base and ceiling
    ///
    /// A `cap` below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            failures: 0,
        }
    }

    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    #[must_use]
    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Interval to wait after the `failures`-th consecutive failure
    ///
    /// `failures` of 0 or 1 both yield `base`.
    ///
    /// ```
    /// use declaration_controller::controller::backoff::ExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
    /// assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
    /// assert_eq!(backoff.delay_for(4), Duration::from_secs(5));
    /// ```
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.delay_for(self.failures)
    }

    /// Get the next backoff duration in whole seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        self.next_backoff().as_secs()
    }

    /// Reset the backoff to the initial state after a success
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
