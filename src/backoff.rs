//! Reconnect backoff policy.
//!
//! Deterministic doubling with a ceiling and no jitter. The policy is
//! stateless: the coordinator keeps the previous delay, starting at
//! `initial`, and doubles it after every refused attempt before waiting.
//!
//! ```text
//! initial = 1s, ceiling = 5s
//!
//! refused #1 -> wait 2s
//! refused #2 -> wait 4s
//! refused #3 -> wait 5s
//! refused #4 -> wait 5s
//! connected  -> previous delay back to 1s
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default starting point of the doubling.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound for the delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

// ============================================================================
// Functions
// ============================================================================

/// Computes the delay that follows `previous`: `min(previous * 2, ceiling)`.
#[inline]
#[must_use]
pub fn next_delay(previous: Duration, ceiling: Duration) -> Duration {
    previous.saturating_mul(2).min(ceiling)
}

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Initial delay and ceiling of the reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_BACKOFF,
            ceiling: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    /// Creates a validated policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `initial` is zero or `ceiling < initial`.
    pub fn new(initial: Duration, ceiling: Duration) -> Result<Self> {
        if initial.is_zero() {
            return Err(Error::config("Initial backoff must be greater than zero"));
        }

        if ceiling < initial {
            return Err(Error::config(format!(
                "Backoff ceiling ({ceiling:?}) must not be below the initial backoff ({initial:?})"
            )));
        }

        Ok(Self { initial, ceiling })
    }

    /// Previous delay assumed before the first refusal and after every reset.
    #[inline]
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// Upper bound for any delay.
    #[inline]
    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Delay that follows `previous` under this policy.
    #[inline]
    #[must_use]
    pub fn next_delay(&self, previous: Duration) -> Duration {
        next_delay(previous, self.ceiling)
    }
}

// ============================================================================
// Tests
// ============================================================================
