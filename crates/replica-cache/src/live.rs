//! Last fetched live state, kept for crash resilience.
//!
//! The copy on disk is never used to avoid a fetch; live state is always
//! loaded fresh. It exists so an operator (or a later bootstrap with no
//! network) has the most recent blob and the headers that described it.

use crate::paths::{atomic_write, atomic_write_json, live_meta_path, live_state_path, read_optional};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStateMeta {
    pub process_id: String,
    pub last_nonce: Option<String>,
    pub last_timestamp: Option<String>,
    pub last_block_height: Option<String>,
    pub size: usize,
    pub fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct LiveStateStore {
    root: PathBuf,
}

impl LiveStateStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache root {}", root.display()))?;
        Ok(Self { root })
    }

    /// Overwrite the stored blob and metadata for a process.
    pub fn persist(&self, blob: &[u8], mut meta: LiveStateMeta) -> Result<PathBuf> {
        let path = live_state_path(&self.root, &meta.process_id)?;
        atomic_write(&path, blob)?;
        meta.size = blob.len();
        if meta.fetched_at.is_empty() {
            meta.fetched_at = chrono::Utc::now().to_rfc3339();
        }
        atomic_write_json(&live_meta_path(&self.root, &meta.process_id)?, &meta)?;
        Ok(path)
    }

    pub fn load(&self, process_id: &str) -> Result<Option<(Vec<u8>, Option<LiveStateMeta>)>> {
        let Some(blob) = read_optional(&live_state_path(&self.root, process_id)?)? else {
            return Ok(None);
        };
        let meta = read_optional(&live_meta_path(&self.root, process_id)?)?
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());
        Ok(Some((blob, meta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persist_overwrites() -> Result<()> {
        let dir = TempDir::new()?;
        let store = LiveStateStore::new(dir.path())?;
        assert!(store.load("proc")?.is_none());

        let meta = LiveStateMeta {
            process_id: "proc".into(),
            last_nonce: Some("7".into()),
            ..LiveStateMeta::default()
        };
        store.persist(b"first", meta.clone())?;
        store.persist(b"second", meta)?;

        let (blob, meta) = store.load("proc")?.expect("persisted");
        assert_eq!(blob, b"second");
        let meta = meta.expect("meta written");
        assert_eq!(meta.size, 6);
        assert_eq!(meta.last_nonce.as_deref(), Some("7"));
        assert!(!meta.fetched_at.is_empty());
        Ok(())
    }
}
