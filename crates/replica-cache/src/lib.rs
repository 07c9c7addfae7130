//! Filesystem cache for aos-replica.
//!
//! Layout under the cache root:
//!
//! ```text
//! checkpoints/<txId>.bin        decompressed checkpoint blob
//! checkpoints/<txId>.meta.json  size, digest, nonce, cached_at
//! processes/<processId>.bin     checkpoint re-associated with its process
//! live/<processId>.bin          last live state fetched (crash resilience)
//! live/<processId>.meta.json    headers that came with it
//! ```
//!
//! Writes are atomic (temp file + rename), so a crash never leaves a torn
//! blob behind.

pub mod checkpoints;
pub mod live;
pub mod paths;

pub use checkpoints::{Association, CheckpointMeta, FsCheckpointStore};
pub use live::{LiveStateMeta, LiveStateStore};

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Both stores rooted at one directory.
#[derive(Debug, Clone)]
pub struct ReplicaCache {
    root: PathBuf,
    checkpoints: FsCheckpointStore,
    live: LiveStateStore,
}

impl ReplicaCache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Ok(Self {
            checkpoints: FsCheckpointStore::new(&root)?,
            live: LiveStateStore::new(&root)?,
            root,
        })
    }

    /// Open the cache at [`paths::default_cache_root`].
    pub fn open_default() -> Result<Self> {
        Self::open(paths::default_cache_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoints(&self) -> &FsCheckpointStore {
        &self.checkpoints
    }

    pub fn live(&self) -> &LiveStateStore {
        &self.live
    }
}
