//! GraphQL client for the transaction index.
//!
//! Used for three lookups:
//! - checkpoint transactions of a process, newest first, one page at a time
//! - the tags of a single transaction
//! - process and module transactions (owner + tags) for the process environment
//!
//! ## Pagination
//!
//! Checkpoint search is cursor based (`first`/`after`, Relay style). The
//! client returns one [`CheckpointPage`] per call and leaves the walk to the
//! caller, so a search can stop as soon as it finds a match.
//!
//! ```ignore
//! let client = GraphQLClient::new(DEFAULT_GRAPHQL_URL);
//! let mut cursor = None;
//! loop {
//!     let page = client.fetch_checkpoint_page("PROCESS_ID", 20, cursor.as_deref())?;
//!     // inspect page.entries ...
//!     if !page.page_info.has_next_page { break; }
//!     cursor = page.next_cursor();
//! }
//! ```

use crate::error::TransportError;
use crate::http::{build_agent, default_timeouts, read_json};
use replica_types::Tag;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const CHECKPOINTS_QUERY: &str = r#"
query GetCheckpoints($processId: String!, $first: Int!, $after: String) {
  transactions(
    first: $first,
    after: $after,
    sort: HEIGHT_DESC,
    tags: [
      { name: "Type", values: ["Checkpoint"] },
      { name: "Process", values: [$processId] }
    ]
  ) {
    edges {
      cursor
      node { id tags { name value } }
    }
    pageInfo { hasNextPage }
  }
}"#;

const TRANSACTION_TAGS_QUERY: &str = r#"
query GetTransactionTags($txId: ID!) {
  transaction(id: $txId) {
    id
    tags { name value }
  }
}"#;

const TRANSACTIONS_BY_ID_QUERY: &str = r#"
query GetTransactions($ids: [ID!]) {
  transactions(ids: $ids) {
    edges {
      node { id owner { address } tags { name value } }
    }
  }
}"#;

#[derive(Clone)]
pub struct GraphQLClient {
    endpoint: String,
    agent: ureq::Agent,
}

/// Relay-style pagination info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
}

impl PageInfo {
    pub fn from_value(value: Option<&Value>) -> Self {
        Self {
            has_next_page: value
                .and_then(|v| v.get("hasNextPage"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// One checkpoint transaction as listed by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub tx_id: String,
    pub cursor: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointPage {
    pub entries: Vec<CheckpointEntry>,
    pub page_info: PageInfo,
}

impl CheckpointPage {
    /// Cursor to continue after this page: the last edge's cursor.
    pub fn next_cursor(&self) -> Option<String> {
        self.entries.last().and_then(|e| e.cursor.clone())
    }
}

/// A transaction with its owner address and tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionNode {
    pub id: String,
    pub owner: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Deserialize)]
struct NodeJson {
    id: String,
    #[serde(default)]
    owner: Option<OwnerJson>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
struct OwnerJson {
    address: Option<String>,
}

impl From<NodeJson> for TransactionNode {
    fn from(node: NodeJson) -> Self {
        Self {
            id: node.id,
            owner: node.owner.and_then(|o| o.address),
            tags: node.tags,
        }
    }
}

impl GraphQLClient {
    pub fn new(endpoint: &str) -> Self {
        let (timeout, connect_timeout) = default_timeouts();
        Self::with_timeouts(endpoint, timeout, connect_timeout)
    }

    pub fn with_timeouts(endpoint: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            agent: build_agent(timeout, connect_timeout),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a query and return its `data` object.
    fn query(&self, query: &str, variables: Value) -> Result<Value, TransportError> {
        let body = json!({ "query": query, "variables": variables });
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|e| TransportError::from_ureq(&self.endpoint, e))?;
        let response: Value = read_json(&self.endpoint, response)?;
        extract_data(&self.endpoint, response)
    }

    /// One page of checkpoint transactions for a process, newest first.
    pub fn fetch_checkpoint_page(
        &self,
        process_id: &str,
        page_size: usize,
        after: Option<&str>,
    ) -> Result<CheckpointPage, TransportError> {
        debug!(process_id, page_size, ?after, "querying checkpoint page");
        let data = self.query(
            CHECKPOINTS_QUERY,
            json!({ "processId": process_id, "first": page_size, "after": after }),
        )?;
        parse_checkpoint_page(&self.endpoint, &data)
    }

    /// Tags of one transaction; `None` if the index does not know it.
    pub fn fetch_transaction_tags(&self, tx_id: &str) -> Result<Option<Vec<Tag>>, TransportError> {
        let data = self.query(TRANSACTION_TAGS_QUERY, json!({ "txId": tx_id }))?;
        match data.get("transaction") {
            None | Some(Value::Null) => Ok(None),
            Some(tx) => {
                let tags = tx.get("tags").cloned().unwrap_or(Value::Array(Vec::new()));
                serde_json::from_value(tags)
                    .map(Some)
                    .map_err(|e| TransportError::decode(&self.endpoint, e))
            }
        }
    }

    /// Owner and tags of one transaction; `None` if the index does not know it.
    pub fn fetch_transaction(&self, tx_id: &str) -> Result<Option<TransactionNode>, TransportError> {
        let data = self.query(TRANSACTIONS_BY_ID_QUERY, json!({ "ids": [tx_id] }))?;
        let node = data
            .pointer("/transactions/edges/0/node")
            .filter(|v| !v.is_null())
            .cloned();
        match node {
            None => Ok(None),
            Some(node) => serde_json::from_value::<NodeJson>(node)
                .map(|n| Some(n.into()))
                .map_err(|e| TransportError::decode(&self.endpoint, e)),
        }
    }
}

/// Surface GraphQL errors, or return the `data` object.
fn extract_data(endpoint: &str, response: Value) -> Result<Value, TransportError> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(TransportError::GraphQL {
                url: endpoint.to_string(),
                message: if message.is_empty() {
                    "unknown error".to_string()
                } else {
                    message
                },
            });
        }
    }
    match response.get("data") {
        Some(data) if !data.is_null() => Ok(data.clone()),
        _ => Err(TransportError::decode(endpoint, "no data in GraphQL response")),
    }
}

fn parse_checkpoint_page(endpoint: &str, data: &Value) -> Result<CheckpointPage, TransportError> {
    let transactions = data
        .get("transactions")
        .ok_or_else(|| TransportError::decode(endpoint, "missing transactions"))?;
    let edges = transactions
        .get("edges")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut entries = Vec::with_capacity(edges.len());
    for edge in edges {
        let node: NodeJson = serde_json::from_value(edge.get("node").cloned().unwrap_or_default())
            .map_err(|e| TransportError::decode(endpoint, e))?;
        entries.push(CheckpointEntry {
            tx_id: node.id,
            cursor: edge.get("cursor").and_then(Value::as_str).map(String::from),
            tags: node.tags,
        });
    }

    Ok(CheckpointPage {
        entries,
        page_info: PageInfo::from_value(transactions.get("pageInfo")),
    })
}
