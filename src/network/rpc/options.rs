use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::network::rpc::feedback::PeerFeedback;

/// Call response validation function
///
/// Called with the decoded response and the feedback of the peer that produced it. An
/// error makes the client move on to the next peer as if the exchange had failed, without
/// recording a failure for the peer.
pub type ValidationFn<R> = Arc<dyn Fn(&R, &PeerFeedback) -> Result<(), String> + Send + Sync>;

/// Result aggregation function for multi-peer calls
///
/// Returning true continues collecting results from other peers; false stops processing.
pub type AggregateFn<R> = Arc<dyn Fn(&R, &PeerFeedback) -> bool + Send + Sync>;

/// Per-call options
pub struct CallOptions<R> {
    /// Interval between attempts; the client default is used when unset
    pub(crate) retry_interval: Option<Duration>,

    /// Number of additional passes over the peer list (0 = no retry)
    pub(crate) max_retries: u64,

    /// Optional response validation
    pub(crate) validation_fn: Option<ValidationFn<R>>,
}

impl<R> CallOptions<R> {
    /// Create options with default values
    pub fn new() -> Self {
        Self {
            retry_interval: None,
            max_retries: 0,
            validation_fn: None,
        }
    }

    /// Configure the maximum number of retries to use for the call
    pub fn with_max_retries(mut self, max_retries: u64) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Configure the retry interval to use for the call
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = Some(retry_interval);
        self
    }

    /// Configure the response validation function to use for the call
    pub fn with_validation_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&R, &PeerFeedback) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validation_fn = Some(Arc::new(f));
        self
    }

    pub fn max_retries(&self) -> u64 {
        self.max_retries
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        self.retry_interval
    }
}

impl<R> Default for CallOptions<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for CallOptions<R> {
    fn clone(&self) -> Self {
        Self {
            retry_interval: self.retry_interval,
            max_retries: self.max_retries,
            validation_fn: self.validation_fn.clone(),
        }
    }
}

impl<R> fmt::Debug for CallOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("retry_interval", &self.retry_interval)
            .field("max_retries", &self.max_retries)
            .field("validation_fn", &self.validation_fn.is_some())
            .finish()
    }
}

/// Per-multicall options
pub struct CallMultiOptions<R> {
    pub(crate) aggregate_fn: Option<AggregateFn<R>>,
}

impl<R> CallMultiOptions<R> {
    pub fn new() -> Self {
        Self { aggregate_fn: None }
    }

    /// Configure the response aggregation function to use
    pub fn with_aggregate_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&R, &PeerFeedback) -> bool + Send + Sync + 'static,
    {
        self.aggregate_fn = Some(Arc::new(f));
        self
    }
}

impl<R> Default for CallMultiOptions<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for CallMultiOptions<R> {
    fn clone(&self) -> Self {
        Self {
            aggregate_fn: self.aggregate_fn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_option_defaults() {
        let opts: CallOptions<u64> = CallOptions::default();
        assert_eq!(opts.max_retries(), 0);
        assert_eq!(opts.retry_interval(), None);
        assert!(opts.validation_fn.is_none());

        let opts = opts
            .with_max_retries(3)
            .with_retry_interval(Duration::from_millis(50))
            .with_validation_fn(|rsp: &u64, _pf| if *rsp > 0 { Ok(()) } else { Err("zero".into()) });
        assert_eq!(opts.max_retries(), 3);
        assert_eq!(opts.retry_interval(), Some(Duration::from_millis(50)));

        let validate = opts.validation_fn.clone().unwrap();
        assert!(validate(&1, &PeerFeedback::nop()).is_ok());
        assert!(validate(&0, &PeerFeedback::nop()).is_err());
    }
}
