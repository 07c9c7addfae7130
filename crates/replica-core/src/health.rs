//! Health reporting.

use replica_types::BootstrapSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Initializing,
    BusyLoadingState,
    BusyPollingMessages,
    Ok,
    /// An explicitly requested checkpoint could not be loaded.
    Halted,
}

impl HealthStatus {
    /// Whether the replica can answer requests meaningfully.
    pub fn is_serving(self) -> bool {
        !matches!(self, HealthStatus::Initializing | HealthStatus::Halted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    /// `-1` before anything has been applied.
    pub last_processed_nonce: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_source: Option<BootstrapSource>,
}
