//! Reconnect delay policy.

use std::time::Duration;

/// Longest delay any policy will return.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(86_400);

/// How long to wait before the next connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Always wait the same delay.
    Fixed(Duration),
    /// Double the delay after every consecutive failure, up to `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    /// A fixed 5 second delay.
    fn default() -> Self {
        ReconnectPolicy::Fixed(Duration::from_secs(5))
    }
}

impl ReconnectPolicy {
    /// Delay before the attempt following `failures` consecutive failures.
    ///
    /// `failures == 0` is the first retry after a session that had been
    /// working.  The result never exceeds [`MAX_RECONNECT_DELAY`].
    pub fn delay(&self, failures: u32) -> Duration {
        let delay = match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
                initial.checked_mul(factor).unwrap_or(max).min(max)
            }
        };
        delay.min(MAX_RECONNECT_DELAY)
    }
}
