//! Error taxonomy of the replica engine.

use crate::activity::Activity;
use replica_transport::TransportError;

/// One malformed sequencer log entry. Fails the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("log entry {index} (message {id}): {reason}", id = .message_id.as_deref().unwrap_or("<unknown>"))]
pub struct ValidationError {
    pub index: usize,
    pub message_id: Option<String>,
    pub reason: String,
}

impl ValidationError {
    pub fn new(index: usize, message_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            index,
            message_id: message_id.map(String::from),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Fatal only for an explicitly requested checkpoint.
    #[error("bootstrap via {strategy} failed: {reason}")]
    Bootstrap {
        strategy: &'static str,
        reason: String,
    },

    #[error("network error: {0}")]
    Network(#[source] TransportError),

    #[error("timeout: {0}")]
    Timeout(#[source] TransportError),

    #[error("invalid sequencer batch: {0}")]
    Validation(#[from] ValidationError),

    /// The engine rejected a message; the batch stops here.
    #[error("apply failed at nonce {nonce} (message {message_id}): {reason}")]
    Apply {
        nonce: u64,
        message_id: String,
        reason: String,
    },

    #[error("snapshot isolation failed: {0}")]
    Snapshot(String),

    #[error("cache error: {0}")]
    Cache(String),

    /// Another mutually exclusive activity holds the replica.
    #[error("{0} already in progress")]
    Busy(Activity),

    #[error("replica halted: {0}")]
    Halted(String),

    #[error("replica has not been bootstrapped")]
    NotReady,
}

/// Coarse classification, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Bootstrap,
    Network,
    Timeout,
    Validation,
    Apply,
    Snapshot,
    Cache,
    Busy,
    Halted,
    NotReady,
}

impl ReplicaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplicaError::Configuration(_) => ErrorKind::Configuration,
            ReplicaError::Bootstrap { .. } => ErrorKind::Bootstrap,
            ReplicaError::Network(_) => ErrorKind::Network,
            ReplicaError::Timeout(_) => ErrorKind::Timeout,
            ReplicaError::Validation(_) => ErrorKind::Validation,
            ReplicaError::Apply { .. } => ErrorKind::Apply,
            ReplicaError::Snapshot(_) => ErrorKind::Snapshot,
            ReplicaError::Cache(_) => ErrorKind::Cache,
            ReplicaError::Busy(_) => ErrorKind::Busy,
            ReplicaError::Halted(_) => ErrorKind::Halted,
            ReplicaError::NotReady => ErrorKind::NotReady,
        }
    }

    /// Whether the next scheduled tick may succeed where this one failed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ReplicaError::Configuration(_) | ReplicaError::Halted(_)
        )
    }

    pub(crate) fn cache(err: anyhow::Error) -> Self {
        ReplicaError::Cache(format!("{err:#}"))
    }
}

impl From<TransportError> for ReplicaError {
    fn from(err: TransportError) -> Self {
        if err.is_timeout() {
            ReplicaError::Timeout(err)
        } else {
            ReplicaError::Network(err)
        }
    }
}

pub type Result<T, E = ReplicaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_stay_distinct_from_network_errors() {
        let timeout: ReplicaError = TransportError::Timeout { url: "su".into() }.into();
        assert_eq!(timeout.kind(), ErrorKind::Timeout);

        let http: ReplicaError = TransportError::Http {
            url: "su".into(),
            status: 504,
            body: "gateway timeout".into(),
        }
        .into();
        assert_eq!(http.kind(), ErrorKind::Network);
        assert!(http.is_recoverable());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(3, Some("msg-1"), "missing nonce");
        assert_eq!(err.to_string(), "log entry 3 (message msg-1): missing nonce");
        let err = ValidationError::new(0, None, "missing message");
        assert_eq!(err.to_string(), "log entry 0 (message <unknown>): missing message");
    }

    #[test]
    fn test_fatal_errors() {
        assert!(!ReplicaError::Configuration("missing process id".into()).is_recoverable());
        assert!(!ReplicaError::Halted("explicit checkpoint".into()).is_recoverable());
        assert!(ReplicaError::Busy(Activity::Polling).is_recoverable());
    }
}
