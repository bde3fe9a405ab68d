//! Retry timing for the accept loop.

use std::time::Duration;

/// Exponential back-off applied when `accept()` fails.
///
/// The delay starts at `initial_delay`, doubles after each consecutive
/// failure and is capped at `max_delay`. A successful accept resets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp both delays to at least one millisecond and order them.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use stompwire::server::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(50),
    ///     max_delay: Duration::ZERO,
    /// }
    /// .normalized();
    /// assert_eq!(cfg.initial_delay, Duration::from_millis(1));
    /// assert_eq!(cfg.max_delay, Duration::from_millis(50));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let floor = Duration::from_millis(1);
        let a = self.initial_delay.max(floor);
        let b = self.max_delay.max(floor);
        Self {
            initial_delay: a.min(b),
            max_delay: a.max(b),
        }
    }

    /// Delay to use after a failure that followed `current`.
    #[must_use]
    pub(crate) fn next(&self, current: Duration) -> Duration { (current * 2).min(self.max_delay) }
}
