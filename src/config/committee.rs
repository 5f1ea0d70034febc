use serde::{Serialize, Deserialize};
use std::time::Duration;

/// Committee client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitteeConfig {
    /// Version suffix of the committee protocol identifier
    pub protocol_version: String,

    /// Maximum time a committee member may take to answer, in milliseconds
    pub max_response_time_ms: u64,

    /// Number of retries over the member list
    pub max_retries: u64,

    /// Interval between retries in milliseconds
    pub retry_interval_ms: u64,
}

impl CommitteeConfig {
    pub fn max_response_time(&self) -> Duration {
        Duration::from_millis(self.max_response_time_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            protocol_version: "1.0.0".to_string(),
            max_response_time_ms: 5_000,
            max_retries: 15,
            retry_interval_ms: 1_000,
        }
    }
}
