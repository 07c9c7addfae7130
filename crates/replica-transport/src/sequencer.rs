//! Sequencer (scheduler unit) client.
//!
//! The sequencer serves a process's ordered message log as a page of
//! edges, each pairing the signed message with the assignment that gave
//! it its nonce:
//!
//! ```text
//! GET {su}/{process}?limit=500&from-nonce=N&to-nonce=M
//! { "page_info": { "has_next_page": true },
//!   "edges": [ { "node": { "message": {..}, "assignment": {..} } } ] }
//! ```

use crate::error::TransportError;
use crate::http::{build_agent, default_timeouts, join_url, read_json};
use replica_types::Tag;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default number of log entries requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawOwner {
    pub address: Option<String>,
}

/// Message half of a log entry, exactly as served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawMessage {
    pub id: Option<String>,
    pub owner: Option<RawOwner>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub data: Option<String>,
    pub target: Option<String>,
    pub from: Option<String>,
    pub anchor: Option<String>,
}

/// Assignment half of a log entry: nonce, epoch, timestamp, block height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawAssignment {
    pub id: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawEntry {
    pub message: Option<RawMessage>,
    pub assignment: Option<RawAssignment>,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    node: RawEntry,
}

#[derive(Debug, Default, Deserialize)]
struct RawPageInfo {
    #[serde(default, alias = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    edges: Vec<RawEdge>,
    #[serde(default, alias = "pageInfo")]
    page_info: Option<RawPageInfo>,
}

/// One page of unvalidated log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    pub entries: Vec<RawEntry>,
    pub has_next_page: bool,
}

impl LogPage {
    pub fn from_json(url: &str, body: &[u8]) -> Result<Self, TransportError> {
        let page: RawPage =
            serde_json::from_slice(body).map_err(|e| TransportError::decode(url, e))?;
        Ok(page.into())
    }
}

impl From<RawPage> for LogPage {
    fn from(page: RawPage) -> Self {
        Self {
            entries: page.edges.into_iter().map(|edge| edge.node).collect(),
            has_next_page: page.page_info.is_some_and(|info| info.has_next_page),
        }
    }
}

/// Window of the log to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub from_nonce: u64,
    /// Inclusive upper bound.
    pub to_nonce: Option<u64>,
    pub limit: usize,
}

impl LogQuery {
    pub fn from_nonce(from_nonce: u64) -> Self {
        Self {
            from_nonce,
            to_nonce: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn to_nonce(mut self, to_nonce: Option<u64>) -> Self {
        self.to_nonce = to_nonce;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Clone)]
pub struct SequencerClient {
    base_url: String,
    agent: ureq::Agent,
}

impl SequencerClient {
    pub fn new(base_url: &str) -> Self {
        let (timeout, connect_timeout) = default_timeouts();
        Self::with_timeouts(base_url, timeout, connect_timeout)
    }

    pub fn with_timeouts(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: build_agent(timeout, connect_timeout),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for a log window.
    pub fn log_url(&self, process_id: &str, query: &LogQuery) -> String {
        let mut url = format!(
            "{}?limit={}&from-nonce={}",
            join_url(&self.base_url, process_id),
            query.limit,
            query.from_nonce
        );
        if let Some(to) = query.to_nonce {
            url.push_str(&format!("&to-nonce={to}"));
        }
        url
    }

    /// Fetch one page of the process log.
    pub fn fetch_log(&self, process_id: &str, query: &LogQuery) -> Result<LogPage, TransportError> {
        let url = self.log_url(process_id, query);
        debug!(%url, "fetching sequencer log page");
        let response = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .call()
            .map_err(|e| TransportError::from_ureq(&url, e))?;
        let page: RawPage = read_json(&url, response)?;
        Ok(page.into())
    }

    /// The process's most recent log entry, as reported by the sequencer.
    pub fn fetch_latest(&self, process_id: &str) -> Result<RawEntry, TransportError> {
        let url = join_url(&self.base_url, &format!("{process_id}/latest"));
        debug!(%url, "fetching sequencer head");
        let response = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .call()
            .map_err(|e| TransportError::from_ureq(&url, e))?;
        read_json(&url, response)
    }
}
