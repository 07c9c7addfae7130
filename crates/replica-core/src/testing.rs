//! In-memory collaborators for tests.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature,
//! for integration tests elsewhere in the workspace.

use crate::engine::ExecutionEngine;
use crate::normalize::{nonce_from_tags, normalize_entry};
use crate::source::{
    CheckpointBlobSource, CheckpointRegistry, LiveStateSource, ProcessDirectory, Sequencer,
};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use replica_transport::sequencer::RawOwner;
use replica_transport::{
    CheckpointEntry, CheckpointPage, LiveStateHeaders, LogPage, LogQuery, PageInfo, RawAssignment,
    RawEntry, RawLiveState, RawMessage, TransactionNode, TransportError,
};
use replica_types::{Message, ProcessEnvironment, ReplayResult, StateBlob, Tag};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const TEST_PROCESS: &str = "proc";

/// A well-formed log entry for `nonce`.
pub fn raw_entry(process_id: &str, nonce: u64) -> RawEntry {
    RawEntry {
        message: Some(RawMessage {
            id: Some(format!("msg-{nonce}")),
            owner: Some(RawOwner {
                address: Some("owner-1".into()),
            }),
            tags: vec![Tag::new("Action", "Eval")],
            data: Some(format!("data-{nonce}")),
            target: Some(process_id.to_string()),
            from: None,
            anchor: None,
        }),
        assignment: Some(RawAssignment {
            id: Some(format!("assignment-{nonce}")),
            tags: vec![
                Tag::new("Nonce", nonce.to_string()),
                Tag::new("Epoch", "0"),
                Tag::new("Timestamp", (1_700_000_000_000 + nonce).to_string()),
                Tag::new("Block-Height", (1_000 + nonce).to_string()),
            ],
        }),
    }
}

/// The normalized form of [`raw_entry`].
pub fn message(nonce: u64) -> Message {
    normalize_entry(TEST_PROCESS, 0, raw_entry(TEST_PROCESS, nonce))
        .unwrap_or_else(|e| panic!("fixture entry must normalize: {e}"))
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .unwrap_or_else(|e| panic!("in-memory gzip cannot fail: {e}"))
}

fn timeout(what: &str) -> TransportError {
    TransportError::Timeout {
        url: format!("mock://{what}"),
    }
}

fn unavailable(what: &str) -> TransportError {
    TransportError::Http {
        url: format!("mock://{what}"),
        status: 503,
        body: "unavailable".into(),
    }
}

// =============================================================================
// Sequencer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Timeout,
    Unavailable,
}

impl Failure {
    fn error(self, what: &str) -> TransportError {
        match self {
            Failure::Timeout => timeout(what),
            Failure::Unavailable => unavailable(what),
        }
    }
}

/// Serves a fixed log, honouring the nonce window and page size.
#[derive(Default)]
pub struct MockSequencer {
    entries: Mutex<Vec<RawEntry>>,
    queries: Mutex<Vec<LogQuery>>,
    fail_next: Mutex<Option<Failure>>,
    latest: Mutex<Option<Option<u64>>>,
    ignore_from_nonce: Mutex<bool>,
}

impl MockSequencer {
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub fn with_nonces(process_id: &str, nonces: Range<u64>) -> Self {
        Self::new(nonces.map(|n| raw_entry(process_id, n)).collect())
    }

    pub fn push(&self, entry: RawEntry) {
        self.entries.lock().push(entry);
    }

    pub fn queries(&self) -> Vec<LogQuery> {
        self.queries.lock().clone()
    }

    pub fn fail_next_fetch_with_timeout(&self) {
        *self.fail_next.lock() = Some(Failure::Timeout);
    }

    pub fn fail_next_fetch(&self) {
        *self.fail_next.lock() = Some(Failure::Unavailable);
    }

    /// Serve every page from the start of the log regardless of `from_nonce`.
    pub fn ignore_from_nonce(&self) {
        *self.ignore_from_nonce.lock() = true;
    }

    /// Override what `latest_nonce` reports (default: highest nonce served).
    pub fn set_latest(&self, latest: Option<u64>) {
        *self.latest.lock() = Some(latest);
    }

    fn nonce_of(entry: &RawEntry) -> Option<u64> {
        entry
            .assignment
            .as_ref()
            .and_then(|a| nonce_from_tags(&a.tags))
    }
}

#[async_trait]
impl Sequencer for MockSequencer {
    async fn fetch_log(&self, _process_id: &str, query: LogQuery) -> Result<LogPage, TransportError> {
        self.queries.lock().push(query);
        if let Some(failure) = self.fail_next.lock().take() {
            return Err(failure.error("sequencer"));
        }
        let from_nonce = if *self.ignore_from_nonce.lock() {
            0
        } else {
            query.from_nonce
        };
        let mut window: Vec<RawEntry> = self
            .entries
            .lock()
            .iter()
            .filter(|e| match Self::nonce_of(e) {
                Some(n) => n >= from_nonce && query.to_nonce.is_none_or(|to| n <= to),
                // Malformed entries are always served so validation sees them.
                None => true,
            })
            .cloned()
            .collect();
        window.sort_by_key(|e| Self::nonce_of(e).unwrap_or(0));
        let has_next_page = window.len() > query.limit;
        window.truncate(query.limit);
        Ok(LogPage {
            entries: window,
            has_next_page,
        })
    }

    async fn latest_nonce(&self, _process_id: &str) -> Result<Option<u64>, TransportError> {
        if let Some(latest) = *self.latest.lock() {
            return Ok(latest);
        }
        Ok(self.entries.lock().iter().filter_map(Self::nonce_of).max())
    }
}

// =============================================================================
// Checkpoint registry and blobs
// =============================================================================

/// Serves predefined pages of checkpoints, newest first.
#[derive(Default)]
pub struct MockRegistry {
    pages: Vec<CheckpointPage>,
    tags: Mutex<HashMap<String, Vec<Tag>>>,
    requests: Mutex<Vec<Option<String>>>,
    fail: Mutex<bool>,
}

pub fn checkpoint_tx(nonce: u64) -> String {
    format!("ckpt-{nonce}")
}

impl MockRegistry {
    /// One page per slice; transaction ids are `ckpt-<nonce>`.
    pub fn from_pages(pages: &[&[u64]]) -> Self {
        Self::from_entries(
            pages
                .iter()
                .map(|nonces| {
                    nonces
                        .iter()
                        .map(|&nonce| {
                            (
                                checkpoint_tx(nonce),
                                vec![
                                    Tag::new("Type", "Checkpoint"),
                                    Tag::new("Process", TEST_PROCESS),
                                    Tag::new("Nonce", nonce.to_string()),
                                ],
                            )
                        })
                        .collect()
                })
                .collect(),
        )
    }

    /// One page per inner vector of `(tx_id, tags)`.
    pub fn from_entries(pages: Vec<Vec<(String, Vec<Tag>)>>) -> Self {
        let count = pages.len();
        let mut tags = HashMap::new();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(p, entries)| CheckpointPage {
                entries: entries
                    .into_iter()
                    .enumerate()
                    .map(|(i, (tx_id, entry_tags))| {
                        tags.insert(tx_id.clone(), entry_tags.clone());
                        CheckpointEntry {
                            tx_id,
                            cursor: Some(format!("cursor-{p}-{i}")),
                            tags: entry_tags,
                        }
                    })
                    .collect(),
                page_info: PageInfo {
                    has_next_page: p + 1 < count,
                },
            })
            .collect();
        Self {
            pages,
            tags: Mutex::new(tags),
            ..Self::default()
        }
    }

    pub fn set_tags(&self, tx_id: &str, tags: Vec<Tag>) {
        self.tags.lock().insert(tx_id.to_string(), tags);
    }

    pub fn fail_all(&self) {
        *self.fail.lock() = true;
    }

    /// The `after` cursor of every page request, in order.
    pub fn requests(&self) -> Vec<Option<String>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CheckpointRegistry for MockRegistry {
    async fn checkpoint_page(
        &self,
        _process_id: &str,
        page_size: usize,
        after: Option<String>,
    ) -> Result<CheckpointPage, TransportError> {
        self.requests.lock().push(after.clone());
        if *self.fail.lock() {
            return Err(unavailable("registry"));
        }
        let index = match &after {
            None => 0,
            Some(cursor) => match self
                .pages
                .iter()
                .position(|p| p.next_cursor().as_ref() == Some(cursor))
            {
                Some(i) => i + 1,
                None => return Ok(CheckpointPage::default()),
            },
        };
        let mut page = self.pages.get(index).cloned().unwrap_or_default();
        if page.entries.len() > page_size {
            page.entries.truncate(page_size);
            page.page_info.has_next_page = true;
        }
        Ok(page)
    }

    async fn transaction_tags(&self, tx_id: &str) -> Result<Option<Vec<Tag>>, TransportError> {
        if *self.fail.lock() {
            return Err(unavailable("registry"));
        }
        Ok(self.tags.lock().get(tx_id).cloned())
    }
}

/// Gzip-compressed blobs by transaction id.
#[derive(Default)]
pub struct MockBlobSource {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MockBlobSource {
    /// Store `raw`, compressed the way the gateway serves it.
    pub fn insert(&self, tx_id: &str, raw: &[u8]) {
        self.blobs.lock().insert(tx_id.to_string(), gzip(raw));
    }

    /// Store bytes verbatim (e.g. something that is not gzip).
    pub fn insert_raw(&self, tx_id: &str, bytes: Vec<u8>) {
        self.blobs.lock().insert(tx_id.to_string(), bytes);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointBlobSource for MockBlobSource {
    async fn fetch_blob(&self, tx_id: &str) -> Result<Vec<u8>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .get(tx_id)
            .cloned()
            .ok_or_else(|| TransportError::Http {
                url: format!("mock://gateway/{tx_id}"),
                status: 404,
                body: "not found".into(),
            })
    }
}

// =============================================================================
// Live state
// =============================================================================

/// Serves one configurable live-state response.
#[derive(Default)]
pub struct MockLiveState {
    response: Mutex<Option<RawLiveState>>,
    calls: AtomicUsize,
}

impl MockLiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with the given `last-ordinate` header.
    pub fn serve(&self, body: &[u8], last_nonce: Option<&str>) {
        *self.response.lock() = Some(RawLiveState {
            body: body.to_vec(),
            headers: LiveStateHeaders {
                last_nonce: last_nonce.map(String::from),
                last_timestamp: Some("1700000000000".into()),
                last_block_height: Some("1000".into()),
            },
        });
    }

    /// Respond with HTTP 503 from now on.
    pub fn fail(&self) {
        *self.response.lock() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveStateSource for MockLiveState {
    async fn fetch_live(&self, _process_id: &str) -> Result<RawLiveState, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .lock()
            .clone()
            .ok_or_else(|| unavailable("state"))
    }
}

// =============================================================================
// Process directory
// =============================================================================

#[derive(Default)]
pub struct MockDirectory {
    nodes: Mutex<HashMap<String, TransactionNode>>,
}

impl MockDirectory {
    pub fn insert(&self, id: &str, owner: &str, tags: Vec<Tag>) {
        self.nodes.lock().insert(
            id.to_string(),
            TransactionNode {
                id: id.to_string(),
                owner: Some(owner.to_string()),
                tags,
            },
        );
    }
}

#[async_trait]
impl ProcessDirectory for MockDirectory {
    async fn transaction(&self, tx_id: &str) -> Result<Option<TransactionNode>, TransportError> {
        Ok(self.nodes.lock().get(tx_id).cloned())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Appends each applied nonce to a comma-separated state.
///
/// Records every call, authoritative or speculative, and can be told to
/// reject a specific nonce.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<u64>>,
    fail_at: Mutex<Option<u64>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_at(&self, nonce: Option<u64>) {
        *self.fail_at.lock() = nonce;
    }

    /// Nonces of every call, in call order.
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().clone()
    }

    /// Render the nonce list a state blob encodes.
    pub fn decode(state: &StateBlob) -> Vec<u64> {
        String::from_utf8_lossy(state.as_bytes())
            .split(',')
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

#[async_trait]
impl ExecutionEngine for RecordingEngine {
    async fn apply(
        &self,
        state: &StateBlob,
        message: &Message,
        _env: &ProcessEnvironment,
    ) -> anyhow::Result<ReplayResult> {
        self.calls.lock().push(message.nonce);
        if *self.fail_at.lock() == Some(message.nonce) {
            anyhow::bail!("engine rejected nonce {}", message.nonce);
        }
        let previous = String::from_utf8_lossy(state.as_bytes()).into_owned();
        let next = if previous.is_empty() {
            message.nonce.to_string()
        } else {
            format!("{previous},{}", message.nonce)
        };
        Ok(ReplayResult {
            output: json!({ "nonce": message.nonce, "previous": previous }),
            messages: vec![json!({ "Target": message.target })],
            gas_used: 1,
            ..ReplayResult::with_state(StateBlob::new(next.into_bytes()))
        })
    }
}
