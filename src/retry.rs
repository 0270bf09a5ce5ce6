//! Contains the bounded retry policy used by the
//! [Coordinator][crate::coordinator::Coordinator] to recover from conflicts.

use std::num::NonZeroU32;
use std::time::Duration;

/// Delay strategy applied between two attempts of the same update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Waits the same amount of time after every failed attempt.
    Fixed(Duration),
    /// Starts from `initial` and doubles after every failed attempt,
    /// never waiting more than `max`.
    Exponential {
        /// Delay after the first failed attempt.
        initial: Duration,
        /// Upper bound of any delay.
        max: Duration,
    },
}

impl Backoff {
    /// Returns the delay to wait after the specified failed attempt,
    /// counting from `1`.
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let exponent = failed_attempt.saturating_sub(1).min(31);
                initial
                    .checked_mul(1_u32 << exponent)
                    .map_or(max, |delay| delay.min(max))
            },
        }
    }
}

/// Bounded retry policy: how many attempts an update may take,
/// and how long to wait between two of them.
///
/// Unbounded retries are not representable, to rule out livelocks
/// under sustained contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(Self::DEFAULT_MAX_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            backoff: Backoff::Fixed(Self::DEFAULT_DELAY),
        }
    }
}

impl RetryPolicy {
    /// Number of attempts used by [`RetryPolicy::default`].
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Fixed delay used by [`RetryPolicy::default`].
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);

    /// Creates a new policy allowing at most `max_attempts` attempts.
    pub fn new(max_attempts: NonZeroU32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Maximum number of attempts an update may take.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Delay strategy between attempts.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub(crate) fn attempts(&self) -> Attempts {
        Attempts {
            spent: 0,
            max: self.max_attempts.get(),
        }
    }
}

/// Attempt counter shared by every failure kind that consumes an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attempts {
    spent: u32,
    max: u32,
}

impl Attempts {
    /// Records a new attempt, returning its number (counting from `1`).
    pub(crate) fn begin(&mut self) -> u32 {
        self.spent += 1;
        self.spent
    }

    pub(crate) fn spent(&self) -> u32 {
        self.spent
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.spent >= self.max
    }
}
