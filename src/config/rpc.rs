use serde::{Serialize, Deserialize};
use std::time::Duration;

/// RPC client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Maximum time spent writing a request in milliseconds
    pub request_write_deadline_ms: u64,

    /// Retry interval for calls that enable retries without setting one, in milliseconds
    pub default_retry_interval_ms: u64,

    /// Timeout for dialing TCP peers in milliseconds
    pub connect_timeout_ms: u64,
}

impl RpcConfig {
    pub fn request_write_deadline(&self) -> Duration {
        Duration::from_millis(self.request_write_deadline_ms)
    }

    pub fn default_retry_interval(&self) -> Duration {
        Duration::from_millis(self.default_retry_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_write_deadline_ms: 5_000,
            default_retry_interval_ms: 1_000,
            connect_timeout_ms: 10_000,
        }
    }
}
