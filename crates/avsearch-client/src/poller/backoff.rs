//! Retry backoff for failed status fetches.
//!
//! # Backoff Algorithm
//!
//! - The first `failure_threshold` consecutive failures retry on the normal
//!   poll interval.
//! - After that: delay = base * 2^(failures - threshold - 1), never shorter than
//!   the poll interval.
//! - The delay is capped at `max_backoff`.
//! - With `give_up_after > 0`, polling stops after that many consecutive
//!   failures.
//! - Any successful fetch resets the count.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Default failure threshold before applying backoff.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default base backoff duration (5 seconds).
pub const DEFAULT_BASE_BACKOFF_SECS: u64 = 5;

/// Default maximum backoff duration (5 minutes).
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

/// Retry policy for the status poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Consecutive failures tolerated before backing off.
    pub failure_threshold: u32,
    /// Base backoff in seconds.
    pub base_backoff_secs: u64,
    /// Backoff cap in seconds.
    pub max_backoff_secs: u64,
    /// Give up after this many consecutive failures. `0` never gives up.
    pub give_up_after: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            base_backoff_secs: DEFAULT_BASE_BACKOFF_SECS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            give_up_after: 0,
        }
    }
}

impl BackoffConfig {
    /// Retry on the plain interval forever.
    pub fn disabled() -> Self {
        Self {
            failure_threshold: u32::MAX,
            give_up_after: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_backoff_secs == 0 {
            return Err(Error::validation("base backoff must be positive"));
        }
        if self.max_backoff_secs < self.base_backoff_secs {
            return Err(Error::validation(
                "maximum backoff must not be shorter than the base backoff",
            ));
        }
        Ok(())
    }

    fn base(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }

    fn max(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

/// Consecutive failure count for one subscription.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    consecutive: u32,
    config: BackoffConfig,
}

impl FailureTracker {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            consecutive: 0,
            config,
        }
    }

    /// Record a failure and return the consecutive failure count.
    pub fn record_failure(&mut self, artifact: &str) -> u32 {
        self.consecutive = self.consecutive.saturating_add(1);
        let backoff = self.backoff();
        if backoff.is_zero() {
            debug!(
                artifact,
                "Status fetch failed ({} in a row), retrying on the normal interval",
                self.consecutive
            );
        } else {
            info!(
                artifact,
                "Status fetch failed ({} in a row), backoff: {:?}", self.consecutive, backoff
            );
        }
        self.consecutive
    }

    /// Clear the failure count after a successful fetch.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Whether the give-up limit has been reached.
    pub fn should_give_up(&self) -> bool {
        self.config.give_up_after > 0 && self.consecutive >= self.config.give_up_after
    }

    /// Backoff for the current failure count, zero below the threshold.
    ///
    /// Formula: base * 2^(failures - threshold - 1) for failures > threshold
    pub fn backoff(&self) -> Duration {
        if self.consecutive <= self.config.failure_threshold {
            return Duration::ZERO;
        }

        let exponent = (self.consecutive - self.config.failure_threshold - 1).min(MAX_EXPONENT);
        let multiplier = 2u32.saturating_pow(exponent);
        let backoff = self.config.base().saturating_mul(multiplier);

        backoff.min(self.config.max())
    }

    /// Wait before the next fetch: the poll interval, or the backoff when longer.
    pub fn next_delay(&self, interval: Duration) -> Duration {
        interval.max(self.backoff())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> FailureTracker {
        FailureTracker::new(BackoffConfig {
            failure_threshold: 3,
            base_backoff_secs: 5,
            max_backoff_secs: 60,
            give_up_after: 0,
        })
    }

    #[test]
    fn test_no_backoff_below_threshold() {
        let mut tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure("a");
            assert_eq!(tracker.backoff(), Duration::ZERO);
            assert_eq!(
                tracker.next_delay(Duration::from_secs(10)),
                Duration::from_secs(10)
            );
        }
    }

    #[test]
    fn test_exponential_backoff_after_threshold() {
        let mut tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure("a");
        }

        tracker.record_failure("a");
        assert_eq!(tracker.backoff(), Duration::from_secs(5));
        tracker.record_failure("a");
        assert_eq!(tracker.backoff(), Duration::from_secs(10));
        tracker.record_failure("a");
        assert_eq!(tracker.backoff(), Duration::from_secs(20));
        tracker.record_failure("a");
        assert_eq!(tracker.backoff(), Duration::from_secs(40));
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut tracker = tracker();
        for _ in 0..50 {
            tracker.record_failure("a");
        }
        assert_eq!(tracker.backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_interval_is_a_floor() {
        let mut tracker = tracker();
        for _ in 0..4 {
            tracker.record_failure("a");
        }
        // backoff is 5s, interval is 30s
        assert_eq!(
            tracker.next_delay(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_success_resets() {
        let mut tracker = tracker();
        for _ in 0..6 {
            tracker.record_failure("a");
        }
        assert!(!tracker.backoff().is_zero());
        tracker.record_success();
        assert_eq!(tracker.consecutive_failures(), 0);
        assert_eq!(tracker.backoff(), Duration::ZERO);
    }

    #[test]
    fn test_give_up() {
        let mut tracker = FailureTracker::new(BackoffConfig {
            give_up_after: 2,
            ..BackoffConfig::default()
        });
        tracker.record_failure("a");
        assert!(!tracker.should_give_up());
        tracker.record_failure("a");
        assert!(tracker.should_give_up());
    }

    #[test]
    fn test_never_gives_up_by_default() {
        let mut tracker = FailureTracker::new(BackoffConfig::default());
        for _ in 0..1000 {
            tracker.record_failure("a");
        }
        assert!(!tracker.should_give_up());
    }

    #[test]
    fn test_disabled_never_backs_off() {
        let mut tracker = FailureTracker::new(BackoffConfig::disabled());
        for _ in 0..100 {
            tracker.record_failure("a");
        }
        assert_eq!(tracker.backoff(), Duration::ZERO);
    }

    #[test]
    fn test_validate() {
        assert!(BackoffConfig::default().validate().is_ok());
        let bad = BackoffConfig {
            base_backoff_secs: 10,
            max_backoff_secs: 5,
            ..BackoffConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
