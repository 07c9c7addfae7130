//! Live state loading from the state service.

use crate::error::Result;
use crate::normalize::parse_numeric;
use crate::source::LiveStateSource;
use replica_cache::live::{LiveStateMeta, LiveStateStore};
use replica_transport::LiveStateHeaders;
use replica_types::StateBlob;
use std::sync::Arc;
use tracing::{debug, warn};

/// A freshly fetched authoritative state.
#[derive(Debug, Clone)]
pub struct LiveState {
    pub blob: StateBlob,
    /// `None` when the header is absent, negative or not a number.
    pub nonce: Option<u64>,
    pub timestamp: Option<u64>,
    pub block_height: Option<u64>,
    pub headers: LiveStateHeaders,
}

impl LiveState {
    /// Whether the reported nonce can anchor the replica.
    pub fn is_determinate(&self) -> bool {
        self.nonce.is_some()
    }
}

pub struct LiveStateLoader {
    source: Arc<dyn LiveStateSource>,
    store: LiveStateStore,
}

impl LiveStateLoader {
    pub fn new(source: Arc<dyn LiveStateSource>, store: LiveStateStore) -> Self {
        Self { source, store }
    }

    /// Fetch the current state. Never answered from the local copy; the
    /// copy is refreshed as a side effect and a failed write only warns.
    pub async fn load(&self, process_id: &str) -> Result<LiveState> {
        let raw = self.source.fetch_live(process_id).await?;
        let headers = raw.headers;
        let numeric = |value: &Option<String>| value.as_deref().and_then(parse_numeric);
        let state = LiveState {
            nonce: numeric(&headers.last_nonce),
            timestamp: numeric(&headers.last_timestamp),
            block_height: numeric(&headers.last_block_height),
            blob: StateBlob::new(raw.body),
            headers,
        };

        let meta = LiveStateMeta {
            process_id: process_id.to_string(),
            last_nonce: state.headers.last_nonce.clone(),
            last_timestamp: state.headers.last_timestamp.clone(),
            last_block_height: state.headers.last_block_height.clone(),
            ..LiveStateMeta::default()
        };
        match self.store.persist(state.blob.as_bytes(), meta) {
            Ok(path) => debug!(process_id, path = %path.display(), "live state persisted"),
            Err(e) => warn!(process_id, error = %e, "failed to persist live state"),
        }

        if !state.is_determinate() {
            warn!(
                process_id,
                header = ?state.headers.last_nonce,
                "live state has no usable nonce"
            );
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplicaError;
    use crate::testing::MockLiveState;
    use tempfile::TempDir;

    fn loader(dir: &TempDir, source: Arc<MockLiveState>) -> LiveStateLoader {
        LiveStateLoader::new(source, LiveStateStore::new(dir.path()).unwrap())
    }

    #[tokio::test]
    async fn test_load_parses_headers_and_persists() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockLiveState::new());
        source.serve(b"{\"n\":1}", Some("17"));
        let loader = loader(&dir, source.clone());

        let live = loader.load("proc").await.unwrap();
        assert_eq!(live.nonce, Some(17));
        assert_eq!(live.timestamp, Some(1_700_000_000_000));
        assert_eq!(live.block_height, Some(1000));

        let (blob, meta) = loader.store.load("proc").unwrap().unwrap();
        assert_eq!(blob, b"{\"n\":1}");
        assert_eq!(meta.unwrap().last_nonce.as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn test_indeterminate_nonce() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockLiveState::new());
        let loader = loader(&dir, source.clone());

        for header in [None, Some("-1"), Some("abc")] {
            source.serve(b"{}", header);
            let live = loader.load("proc").await.unwrap();
            assert!(!live.is_determinate(), "header {header:?}");
        }
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockLiveState::new());
        source.fail();
        let err = loader(&dir, source).load("proc").await.unwrap_err();
        assert!(matches!(err, ReplicaError::Network(_)));
    }
}
