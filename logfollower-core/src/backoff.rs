use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;

/// The retry back-off policy the follower loop applies to transient
/// failures: first retry after 1s, doubling up to a configurable
/// ceiling, reset to 1s after any successful fetch-and-apply round.
pub struct RetryPolicy {
    inner: backoff::ExponentialBackoff,
}

impl RetryPolicy {
    pub fn new(max_interval: Duration) -> RetryPolicy {
        let inner = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_multiplier(2.0)
            .with_max_interval(max_interval)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();
        RetryPolicy { inner }
    }

    /// Advances the policy and returns how long to sleep before the
    /// next retry. `with_max_elapsed_time(None)` means this never
    /// returns `None`.
    pub fn next_delay(&mut self) -> Duration {
        self.inner
            .next_backoff()
            .expect("unbounded backoff never exhausts")
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}
