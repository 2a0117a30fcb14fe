//! # Recovery policy for failing lifecycle hooks.
//!
//! [`RecoveryPolicy`] controls how a unit reacts to hook failures:
//! - [`RecoveryPolicy::max_retries`] the retry budget;
//! - [`RecoveryPolicy::retry_delay`] the base wait between attempts;
//! - [`RecoveryPolicy::fallback`] whether an exhausted unit degrades to
//!   fallback mode instead of being disabled.
//!
//! The wait before retry `n` (1-based) is `retry_delay × n`, so repeated
//! failures back off linearly. Because the delay is derived purely from the
//! retry count, timings are fully deterministic and reproducible under a
//! paused test clock.
//!
//! [`RecoveryOverrides`] is the partial form carried by individual feature
//! configs; it is resolved against the manager-wide defaults exactly once,
//! with [`RecoveryPolicy::merge`], when the cell is built.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use plugboard::{RecoveryOverrides, RecoveryPolicy};
//!
//! let defaults = RecoveryPolicy::default();
//! let policy = RecoveryPolicy::merge(defaults, RecoveryOverrides::new().max_retries(5));
//!
//! assert_eq!(policy.max_retries, 5);
//! assert_eq!(policy.retry_delay, defaults.retry_delay);
//! assert_eq!(policy.delay_for(2), defaults.retry_delay * 2);
//! ```

use std::time::Duration;

/// Resolved recovery policy of a single unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Retries granted after the initial failed attempt.
    pub max_retries: u32,
    /// Base wait; retry `n` waits `retry_delay × n`.
    pub retry_delay: Duration,
    /// On exhaustion: degrade to fallback mode instead of disabling.
    pub fallback: bool,
}

impl Default for RecoveryPolicy {
    /// Returns a policy with:
    /// - `max_retries = 3`;
    /// - `retry_delay = 1s`;
    /// - `fallback = false`.
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            fallback: false,
        }
    }
}

impl RecoveryPolicy {
    /// Computes the wait before the given retry (1-based).
    ///
    /// Linear growth: `retry_delay × attempt`, saturating instead of
    /// overflowing. Attempt 0 yields zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }

    /// Resolves a partial per-feature policy against the defaults.
    ///
    /// Pure function: fields present in `overrides` win, everything else
    /// comes from `defaults`.
    pub fn merge(defaults: RecoveryPolicy, overrides: RecoveryOverrides) -> RecoveryPolicy {
        RecoveryPolicy {
            max_retries: overrides.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: overrides.retry_delay.unwrap_or(defaults.retry_delay),
            fallback: overrides.fallback.unwrap_or(defaults.fallback),
        }
    }
}

/// Partial recovery policy attached to a single feature.
///
/// Unset fields fall back to the manager defaults at merge time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryOverrides {
    /// Overrides [`RecoveryPolicy::max_retries`].
    pub max_retries: Option<u32>,
    /// Overrides [`RecoveryPolicy::retry_delay`].
    pub retry_delay: Option<Duration>,
    /// Overrides [`RecoveryPolicy::fallback`].
    pub fallback: Option<bool>,
}

impl RecoveryOverrides {
    /// Creates an empty override set (everything inherited).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget.
    #[inline]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the base retry delay.
    #[inline]
    pub fn retry_delay(mut self, d: Duration) -> Self {
        self.retry_delay = Some(d);
        self
    }

    /// Enables or disables fallback mode on exhaustion.
    #[inline]
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback = Some(enabled);
        self
    }
}

/// A full policy is also a complete override set.
impl From<RecoveryPolicy> for RecoveryOverrides {
    fn from(policy: RecoveryPolicy) -> Self {
        Self {
            max_retries: Some(policy.max_retries),
            retry_delay: Some(policy.retry_delay),
            fallback: Some(policy.fallback),
        }
    }
}
