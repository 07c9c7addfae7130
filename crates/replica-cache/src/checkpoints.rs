//! Checkpoint blob store.

use crate::paths::{
    atomic_write, atomic_write_json, checkpoint_blob_path, checkpoint_meta_path,
    ensure_parent_dirs, process_state_path, read_optional,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sidecar metadata written next to each cached checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub tx_id: String,
    pub size: usize,
    pub sha256: String,
    #[serde(default)]
    pub nonce: Option<u64>,
    pub cached_at: String,
}

/// How a checkpoint was made available under its process path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// The process path already held this checkpoint.
    Unchanged,
    Linked,
    /// Hard links unsupported (e.g. across filesystems); the blob was copied.
    Copied,
}

/// Decompressed checkpoint blobs keyed by transaction id.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        checkpoint_blob_path(&self.root, tx_id)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    pub fn get(&self, tx_id: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&checkpoint_blob_path(&self.root, tx_id)?)
    }

    /// Store a decompressed blob and its metadata.
    pub fn put(&self, tx_id: &str, blob: &[u8]) -> Result<CheckpointMeta> {
        let path = checkpoint_blob_path(&self.root, tx_id)?;
        atomic_write(&path, blob)?;
        let meta = CheckpointMeta {
            tx_id: tx_id.to_string(),
            size: blob.len(),
            sha256: hex::encode(Sha256::digest(blob)),
            nonce: None,
            cached_at: chrono::Utc::now().to_rfc3339(),
        };
        atomic_write_json(&checkpoint_meta_path(&self.root, tx_id)?, &meta)?;
        debug!(tx_id, size = blob.len(), path = %path.display(), "cached checkpoint");
        Ok(meta)
    }

    pub fn meta(&self, tx_id: &str) -> Result<Option<CheckpointMeta>> {
        let Some(bytes) = read_optional(&checkpoint_meta_path(&self.root, tx_id)?)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(tx_id, error = %e, "ignoring unreadable checkpoint metadata");
                Ok(None)
            }
        }
    }

    /// Remember the nonce extracted from the checkpoint's tags.
    pub fn record_nonce(&self, tx_id: &str, nonce: u64) -> Result<()> {
        let mut meta = self
            .meta(tx_id)?
            .ok_or_else(|| anyhow!("checkpoint {tx_id} is not cached"))?;
        meta.nonce = Some(nonce);
        atomic_write_json(&checkpoint_meta_path(&self.root, tx_id)?, &meta)
    }

    /// Make the checkpoint available under `processes/<process_id>.bin`.
    ///
    /// The tx-keyed copy stays in place so later bootstraps of the same
    /// checkpoint skip the download.
    pub fn associate(&self, tx_id: &str, process_id: &str) -> Result<(PathBuf, Association)> {
        let source = checkpoint_blob_path(&self.root, tx_id)?;
        let target = process_state_path(&self.root, process_id)?;
        if !source.is_file() {
            return Err(anyhow!(
                "checkpoint {} not found at {}",
                tx_id,
                source.display()
            ));
        }
        if source == target || same_contents(&source, &target)? {
            return Ok((target, Association::Unchanged));
        }

        ensure_parent_dirs(&target)?;
        if target.exists() {
            std::fs::remove_file(&target)
                .with_context(|| format!("Failed to replace {}", target.display()))?;
        }
        let association = match std::fs::hard_link(&source, &target) {
            Ok(()) => Association::Linked,
            Err(e) => {
                debug!(error = %e, "hard link failed, copying checkpoint");
                let bytes = std::fs::read(&source)
                    .with_context(|| format!("Failed to read {}", source.display()))?;
                atomic_write(&target, &bytes)?;
                Association::Copied
            }
        };
        Ok((target, association))
    }

    /// Blob currently associated with a process, if any.
    pub fn load_process_state(&self, process_id: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&process_state_path(&self.root, process_id)?)
    }
}

fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    let Some(left) = read_optional(b)? else {
        return Ok(false);
    };
    let right = std::fs::read(a).with_context(|| format!("Failed to read {}", a.display()))?;
    Ok(left.len() == right.len() && Sha256::digest(&left) == Sha256::digest(&right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_and_meta() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FsCheckpointStore::new(dir.path())?;
        assert!(!store.contains("tx1"));
        assert_eq!(store.get("tx1")?, None);

        let meta = store.put("tx1", b"memory")?;
        assert_eq!(meta.size, 6);
        assert_eq!(meta.sha256.len(), 64);
        assert!(store.contains("tx1"));
        assert_eq!(store.get("tx1")?.as_deref(), Some(&b"memory"[..]));

        store.record_nonce("tx1", 40)?;
        assert_eq!(store.meta("tx1")?.and_then(|m| m.nonce), Some(40));
        Ok(())
    }

    #[test]
    fn test_associate_keeps_tx_copy() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FsCheckpointStore::new(dir.path())?;
        store.put("tx1", b"memory")?;

        let (path, association) = store.associate("tx1", "proc")?;
        assert_ne!(association, Association::Unchanged);
        assert_eq!(std::fs::read(&path)?, b"memory");
        assert!(store.contains("tx1"));
        assert_eq!(store.load_process_state("proc")?.as_deref(), Some(&b"memory"[..]));

        let (_, again) = store.associate("tx1", "proc")?;
        assert_eq!(again, Association::Unchanged);
        Ok(())
    }

    #[test]
    fn test_associate_replaces_previous_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FsCheckpointStore::new(dir.path())?;
        store.put("old", b"v1")?;
        store.put("new", b"v2")?;
        store.associate("old", "proc")?;
        store.associate("new", "proc")?;
        assert_eq!(store.load_process_state("proc")?.as_deref(), Some(&b"v2"[..]));
        assert_eq!(store.get("old")?.as_deref(), Some(&b"v1"[..]));
        Ok(())
    }

    #[test]
    fn test_associate_missing_checkpoint_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FsCheckpointStore::new(dir.path())?;
        assert!(store.associate("absent", "proc").is_err());
        Ok(())
    }
}
