//! Replica configuration.

use crate::error::{ReplicaError, Result};
use replica_transport::http::default_timeouts;
use replica_transport::Endpoints;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5_000);
pub const DEFAULT_POLL_JITTER: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MESSAGE_PAGE_SIZE: usize = 500;
pub const DEFAULT_CHECKPOINT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub process_id: String,
    /// Derived from process metadata when unset.
    pub module_id: Option<String>,
    pub endpoints: Endpoints,
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to each poll interval.
    pub poll_jitter: Duration,
    /// `None` disables periodic full refresh.
    pub full_refresh_interval: Option<Duration>,
    /// Inclusive; nothing above this nonce is ever applied.
    pub forward_limit: Option<u64>,
    /// Explicit checkpoint pin. Failing to load it halts the replica.
    pub checkpoint_tx_id: Option<String>,
    pub load_from_checkpoint: bool,
    /// Start from empty state at nonce -1; overrides checkpoint options.
    pub load_from_scratch: bool,
    pub message_page_size: usize,
    pub checkpoint_page_size: usize,
    /// Defaults honour `AOS_REPLICA_HTTP_TIMEOUT_SECS`.
    pub request_timeout: Duration,
    /// Defaults honour `AOS_REPLICA_CONNECT_TIMEOUT_SECS`.
    pub connect_timeout: Duration,
    pub cache_root: PathBuf,
}

impl ReplicaConfig {
    pub fn new(process_id: impl Into<String>) -> Self {
        let (request_timeout, connect_timeout) = default_timeouts();
        Self {
            process_id: process_id.into(),
            module_id: None,
            endpoints: Endpoints::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_jitter: DEFAULT_POLL_JITTER,
            full_refresh_interval: None,
            forward_limit: None,
            checkpoint_tx_id: None,
            load_from_checkpoint: false,
            load_from_scratch: false,
            message_page_size: DEFAULT_MESSAGE_PAGE_SIZE,
            checkpoint_page_size: DEFAULT_CHECKPOINT_PAGE_SIZE,
            request_timeout,
            connect_timeout,
            cache_root: replica_cache::paths::default_cache_root(),
        }
    }

    pub fn with_scratch(mut self) -> Self {
        self.load_from_scratch = true;
        self
    }

    pub fn with_checkpoint_tx(mut self, tx_id: impl Into<String>) -> Self {
        self.checkpoint_tx_id = Some(tx_id.into());
        self
    }

    pub fn with_auto_checkpoint(mut self) -> Self {
        self.load_from_checkpoint = true;
        self
    }

    pub fn with_forward_limit(mut self, limit: u64) -> Self {
        self.forward_limit = Some(limit);
        self
    }

    pub fn with_full_refresh(mut self, interval: Duration) -> Self {
        self.full_refresh_interval = Some(interval);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration, jitter: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_jitter = jitter;
        self
    }

    pub fn with_message_page_size(mut self, size: usize) -> Self {
        self.message_page_size = size;
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Reject configurations the replica cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.process_id.trim().is_empty() {
            return Err(ReplicaError::Configuration(
                "a process id to monitor is required".into(),
            ));
        }
        if self.message_page_size == 0 || self.checkpoint_page_size == 0 {
            return Err(ReplicaError::Configuration(
                "page sizes must be greater than zero".into(),
            ));
        }
        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ReplicaError::Configuration(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Repair soft misconfigurations, warning about each.
    pub fn normalized(mut self) -> Self {
        self.process_id = self.process_id.trim().to_string();
        if self.poll_interval.is_zero() {
            warn!(
                default_ms = DEFAULT_POLL_INTERVAL.as_millis() as u64,
                "poll interval must be positive, using default"
            );
            self.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        if self.full_refresh_interval.is_some_and(|d| d.is_zero()) {
            self.full_refresh_interval = None;
        }
        if self
            .checkpoint_tx_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            self.checkpoint_tx_id = None;
        }
        if self.load_from_scratch && (self.checkpoint_tx_id.is_some() || self.load_from_checkpoint) {
            warn!("loading from scratch; checkpoint options are ignored");
        }
        self
    }

    /// Full refresh runs only when configured and no checkpoint is pinned.
    pub fn full_refresh_enabled(&self) -> bool {
        self.full_refresh_interval.is_some() && self.checkpoint_tx_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_process_id_is_a_configuration_error() {
        let err = ReplicaConfig::new("  ").validate().unwrap_err();
        assert!(matches!(err, ReplicaError::Configuration(_)));
        assert!(ReplicaConfig::new("pid").validate().is_ok());
    }

    #[test]
    fn test_normalized_repairs_soft_errors() {
        let config = ReplicaConfig::new(" pid ")
            .with_poll_interval(Duration::ZERO, Duration::ZERO)
            .with_full_refresh(Duration::ZERO)
            .with_checkpoint_tx(" ")
            .normalized();
        assert_eq!(config.process_id, "pid");
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.full_refresh_interval, None);
        assert_eq!(config.checkpoint_tx_id, None);
    }

    #[test]
    fn test_timeouts_follow_transport_defaults() {
        let config = ReplicaConfig::new("pid");
        assert_eq!(
            (config.request_timeout, config.connect_timeout),
            default_timeouts()
        );
        let mut zero = config.clone();
        zero.connect_timeout = Duration::ZERO;
        assert!(matches!(
            zero.validate().unwrap_err(),
            ReplicaError::Configuration(_)
        ));
    }

    #[test]
    fn test_checkpoint_pin_disables_full_refresh() {
        let config = ReplicaConfig::new("pid").with_full_refresh(Duration::from_secs(60));
        assert!(config.full_refresh_enabled());
        let pinned = config.with_checkpoint_tx("tx");
        assert!(!pinned.full_refresh_enabled());
    }
}
