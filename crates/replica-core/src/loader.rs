//! Checkpoint preparation: download, decompress, cache, associate.

use crate::error::{ReplicaError, Result};
use crate::normalize::nonce_from_tags;
use crate::source::{CheckpointBlobSource, CheckpointRegistry};
use flate2::read::GzDecoder;
use replica_cache::checkpoints::{Association, FsCheckpointStore};
use replica_types::StateBlob;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A checkpoint ready to be installed as replica state.
#[derive(Debug, Clone)]
pub struct PreparedCheckpoint {
    pub tx_id: String,
    /// `None` when the checkpoint carries no usable nonce tag.
    pub nonce: Option<u64>,
    pub blob: StateBlob,
    /// Process-keyed location of the blob in the cache.
    pub path: PathBuf,
    pub association: Association,
}

pub struct CheckpointLoader {
    blobs: Arc<dyn CheckpointBlobSource>,
    registry: Arc<dyn CheckpointRegistry>,
    store: FsCheckpointStore,
}

impl CheckpointLoader {
    pub fn new(
        blobs: Arc<dyn CheckpointBlobSource>,
        registry: Arc<dyn CheckpointRegistry>,
        store: FsCheckpointStore,
    ) -> Self {
        Self {
            blobs,
            registry,
            store,
        }
    }

    pub fn store(&self) -> &FsCheckpointStore {
        &self.store
    }

    /// Make checkpoint `tx_id` available for `process_id`.
    ///
    /// The decompressed blob is cached under the transaction id, so only
    /// the first call for a given checkpoint touches the gateway. A missing
    /// or unparsable nonce tag is not an error.
    pub async fn prepare(&self, process_id: &str, tx_id: &str) -> Result<PreparedCheckpoint> {
        let cached = self.store.get(tx_id).map_err(ReplicaError::cache)?;
        let raw = match cached {
            Some(bytes) => {
                debug!(tx_id, size = bytes.len(), "checkpoint cache hit");
                bytes
            }
            None => {
                let compressed = self.blobs.fetch_blob(tx_id).await?;
                let raw = gunzip(&compressed).map_err(|e| ReplicaError::Bootstrap {
                    strategy: "checkpoint",
                    reason: format!("checkpoint {tx_id} could not be decompressed: {e}"),
                })?;
                let meta = self.store.put(tx_id, &raw).map_err(ReplicaError::cache)?;
                info!(
                    tx_id,
                    compressed = compressed.len(),
                    size = meta.size,
                    sha256 = %meta.sha256,
                    "checkpoint downloaded"
                );
                raw
            }
        };

        let (path, association) = self
            .store
            .associate(tx_id, process_id)
            .map_err(ReplicaError::cache)?;
        debug!(tx_id, process_id, path = %path.display(), ?association, "checkpoint associated");

        let nonce = self.checkpoint_nonce(tx_id).await;
        Ok(PreparedCheckpoint {
            tx_id: tx_id.to_string(),
            nonce,
            blob: StateBlob::new(raw),
            path,
            association,
        })
    }

    /// Nonce from the cached metadata, else from the transaction tags.
    async fn checkpoint_nonce(&self, tx_id: &str) -> Option<u64> {
        if let Ok(Some(meta)) = self.store.meta(tx_id) {
            if meta.nonce.is_some() {
                return meta.nonce;
            }
        }
        let tags = match self.registry.transaction_tags(tx_id).await {
            Ok(Some(tags)) => tags,
            Ok(None) => {
                warn!(tx_id, "checkpoint transaction not found in registry, nonce unknown");
                return None;
            }
            Err(e) => {
                warn!(tx_id, error = %e, "failed to fetch checkpoint tags, nonce unknown");
                return None;
            }
        };
        let Some(nonce) = nonce_from_tags(&tags) else {
            warn!(tx_id, "checkpoint has no numeric Nonce/Ordinate tag");
            return None;
        };
        if let Err(e) = self.store.record_nonce(tx_id, nonce) {
            warn!(tx_id, error = %e, "failed to record checkpoint nonce");
        }
        Some(nonce)
    }
}

fn gunzip(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(compressed.len().saturating_mul(4));
    GzDecoder::new(compressed).read_to_end(&mut out)?;
    Ok(out)
}
