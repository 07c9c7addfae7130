//! Replica synchronization state.

use serde::{Deserialize, Serialize};
use std::collections::TryReserveError;
use std::fmt;

/// Opaque process state bytes.
///
/// Owning a `StateBlob` means owning its bytes: `Clone` is a deep copy and
/// no two blobs ever alias the same buffer. [`StateBlob::try_clone`] is the
/// fallible variant used where an allocation failure must be reported
/// instead of aborting.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StateBlob(Vec<u8>);

#[derive(Debug, thiserror::Error)]
#[error("failed to copy {len} byte state blob: {source}")]
pub struct BlobCopyError {
    pub len: usize,
    #[source]
    pub source: TryReserveError,
}

impl StateBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deep copy that reports allocation failure instead of aborting.
    pub fn try_clone(&self) -> Result<Self, BlobCopyError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(self.0.len())
            .map_err(|source| BlobCopyError {
                len: self.0.len(),
                source,
            })?;
        bytes.extend_from_slice(&self.0);
        Ok(Self(bytes))
    }
}

impl fmt::Debug for StateBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateBlob({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for StateBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Where the replica's initial state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapSource {
    Scratch,
    ExplicitCheckpoint,
    AutoCheckpoint,
    LiveState,
    /// Nothing could be loaded; started from a default state.
    Empty,
}

impl BootstrapSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapSource::Scratch => "scratch",
            BootstrapSource::ExplicitCheckpoint => "explicit-checkpoint",
            BootstrapSource::AutoCheckpoint => "auto-checkpoint",
            BootstrapSource::LiveState => "live-state",
            BootstrapSource::Empty => "empty",
        }
    }
}

impl fmt::Display for BootstrapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published full-state snapshot of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub tx_id: String,
    /// `None` when the transaction carries no parsable `Nonce`/`Ordinate` tag.
    pub nonce: Option<u64>,
}

/// `-1` for "nothing applied yet", otherwise the nonce.
pub fn signed_nonce(nonce: Option<u64>) -> i64 {
    nonce.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

/// Synchronization state of one replicated process.
///
/// `last_processed_nonce` is `None` until a message has been applied (or a
/// bootstrap source reported a nonce). Once set it only moves forward:
/// [`ProcessReplica::commit`] and [`ProcessReplica::ratchet`] both refuse to
/// regress it.
#[derive(Debug, Clone)]
pub struct ProcessReplica {
    process_id: String,
    state: StateBlob,
    last_processed_nonce: Option<u64>,
    last_timestamp: Option<u64>,
    last_block_height: Option<u64>,
    bootstrap_source: Option<BootstrapSource>,
    forward_limit: Option<u64>,
}

impl ProcessReplica {
    pub fn new(process_id: impl Into<String>, forward_limit: Option<u64>) -> Self {
        Self {
            process_id: process_id.into(),
            state: StateBlob::empty(),
            last_processed_nonce: None,
            last_timestamp: None,
            last_block_height: None,
            bootstrap_source: None,
            forward_limit,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn state(&self) -> &StateBlob {
        &self.state
    }

    pub fn last_processed_nonce(&self) -> Option<u64> {
        self.last_processed_nonce
    }

    /// First nonce that has not been applied yet.
    pub fn next_nonce(&self) -> u64 {
        self.last_processed_nonce.map_or(0, |n| n.saturating_add(1))
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn last_block_height(&self) -> Option<u64> {
        self.last_block_height
    }

    pub fn bootstrap_source(&self) -> Option<BootstrapSource> {
        self.bootstrap_source
    }

    pub fn forward_limit(&self) -> Option<u64> {
        self.forward_limit
    }

    /// Whether the forward limit has been reached; always false without one.
    pub fn limit_reached(&self) -> bool {
        match (self.forward_limit, self.last_processed_nonce) {
            (Some(limit), Some(last)) => last >= limit,
            _ => false,
        }
    }

    /// Whether a message with this nonce may still be applied under the limit.
    pub fn within_limit(&self, nonce: u64) -> bool {
        self.forward_limit.is_none_or(|limit| nonce <= limit)
    }

    /// Install the bootstrapped state. Only used before the replica goes live.
    pub fn install(
        &mut self,
        state: StateBlob,
        nonce: Option<u64>,
        timestamp: Option<u64>,
        source: BootstrapSource,
    ) {
        self.state = state;
        self.last_processed_nonce = nonce;
        self.last_timestamp = timestamp;
        self.last_block_height = None;
        self.bootstrap_source = Some(source);
    }

    /// Commit the result of applying the message at `nonce`.
    ///
    /// Returns `false` and leaves the replica untouched if `nonce` would not
    /// advance the cursor.
    pub fn commit(
        &mut self,
        state: StateBlob,
        nonce: u64,
        timestamp: u64,
        block_height: u64,
    ) -> bool {
        if self.last_processed_nonce.is_some_and(|last| nonce <= last) {
            return false;
        }
        self.state = state;
        self.last_processed_nonce = Some(nonce);
        self.last_timestamp = Some(timestamp);
        self.last_block_height = Some(block_height);
        true
    }

    /// Advance the cursor past a message that needs no evaluation.
    pub fn skip_to(&mut self, nonce: u64) -> bool {
        if self.last_processed_nonce.is_some_and(|last| nonce <= last) {
            return false;
        }
        self.last_processed_nonce = Some(nonce);
        true
    }

    /// Replace state and nonce together, only if `nonce` is strictly greater.
    pub fn ratchet(&mut self, state: StateBlob, nonce: u64, timestamp: Option<u64>) -> bool {
        if self.last_processed_nonce.is_some_and(|last| nonce <= last) {
            return false;
        }
        self.state = state;
        self.last_processed_nonce = Some(nonce);
        if timestamp.is_some() {
            self.last_timestamp = timestamp;
        }
        true
    }
}
