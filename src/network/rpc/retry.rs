use std::time::Duration;
use backoff::backoff::{Backoff, Constant};

/// Constant backoff that gives up after a fixed number of retries
pub struct LimitedRetries {
    inner: Constant,
    max_retries: u64,
    retries: u64,
}

impl LimitedRetries {
    pub fn new(interval: Duration, max_retries: u64) -> Self {
        Self {
            inner: Constant::new(interval),
            max_retries,
            retries: 0,
        }
    }

    /// Number of retries handed out so far
    pub fn retries(&self) -> u64 {
        self.retries
    }
}

impl Backoff for LimitedRetries {
    fn reset(&mut self) {
        self.retries = 0;
        self.inner.reset();
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        self.retries += 1;
        self.inner.next_backoff()
    }
}
