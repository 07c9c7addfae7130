//! Remote collaborators as async traits.
//!
//! The engine only ever talks to these traits. [`HttpSources`] implements
//! all of them over the blocking clients in `replica-transport`, running
//! each call on the blocking pool under a deadline; tests substitute the
//! in-memory versions from `testing`.

use crate::normalize::nonce_from_tags;
use async_trait::async_trait;
use replica_transport::{
    CheckpointPage, Endpoints, GatewayClient, GraphQLClient, LogPage, LogQuery, RawLiveState,
    SequencerClient, StateClient, TransactionNode, TransportError,
};
use replica_types::Tag;
use std::time::Duration;

type TransportResult<T> = std::result::Result<T, TransportError>;

/// Ordered message log of a process.
#[async_trait]
pub trait Sequencer: Send + Sync {
    async fn fetch_log(&self, process_id: &str, query: LogQuery) -> TransportResult<LogPage>;

    /// Nonce of the most recent entry the sequencer has assigned.
    async fn latest_nonce(&self, process_id: &str) -> TransportResult<Option<u64>>;
}

/// Index of published checkpoint transactions.
#[async_trait]
pub trait CheckpointRegistry: Send + Sync {
    /// One page of checkpoints for a process, newest first.
    async fn checkpoint_page(
        &self,
        process_id: &str,
        page_size: usize,
        after: Option<String>,
    ) -> TransportResult<CheckpointPage>;

    async fn transaction_tags(&self, tx_id: &str) -> TransportResult<Option<Vec<Tag>>>;
}

/// Compressed checkpoint payloads by transaction id.
#[async_trait]
pub trait CheckpointBlobSource: Send + Sync {
    async fn fetch_blob(&self, tx_id: &str) -> TransportResult<Vec<u8>>;
}

/// Authoritative current state of a process.
#[async_trait]
pub trait LiveStateSource: Send + Sync {
    async fn fetch_live(&self, process_id: &str) -> TransportResult<RawLiveState>;
}

/// Process and module transactions (owner + tags).
#[async_trait]
pub trait ProcessDirectory: Send + Sync {
    async fn transaction(&self, tx_id: &str) -> TransportResult<Option<TransactionNode>>;
}

/// All collaborators backed by the real HTTP clients.
#[derive(Clone)]
pub struct HttpSources {
    sequencer: SequencerClient,
    graphql: GraphQLClient,
    gateway: GatewayClient,
    state: StateClient,
    deadline: Duration,
}

/// Slack between the client's own timeout and the outer deadline.
const DEADLINE_SLACK: Duration = Duration::from_secs(5);

impl HttpSources {
    pub fn new(endpoints: &Endpoints, request_timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            sequencer: SequencerClient::with_timeouts(
                &endpoints.sequencer,
                request_timeout,
                connect_timeout,
            ),
            graphql: GraphQLClient::with_timeouts(&endpoints.graphql, request_timeout, connect_timeout),
            gateway: GatewayClient::with_timeouts(&endpoints.gateway, request_timeout, connect_timeout),
            state: StateClient::with_timeouts(&endpoints.state, request_timeout, connect_timeout),
            deadline: request_timeout + DEADLINE_SLACK,
        }
    }

    /// Run a blocking client call off the async runtime, bounded by the deadline.
    async fn blocking<T, F>(&self, label: String, call: F) -> TransportResult<T>
    where
        F: FnOnce() -> TransportResult<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.deadline, tokio::task::spawn_blocking(call)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(TransportError::Network {
                url: label,
                reason: format!("request task failed: {join_err}"),
            }),
            Err(_) => Err(TransportError::Timeout { url: label }),
        }
    }
}

#[async_trait]
impl Sequencer for HttpSources {
    async fn fetch_log(&self, process_id: &str, query: LogQuery) -> TransportResult<LogPage> {
        let client = self.sequencer.clone();
        let process_id = process_id.to_string();
        let label = client.log_url(&process_id, &query);
        self.blocking(label, move || client.fetch_log(&process_id, &query))
            .await
    }

    async fn latest_nonce(&self, process_id: &str) -> TransportResult<Option<u64>> {
        let client = self.sequencer.clone();
        let process_id = process_id.to_string();
        let label = format!("{}/{}/latest", client.base_url(), process_id);
        let entry = self
            .blocking(label, move || client.fetch_latest(&process_id))
            .await?;
        let from_assignment = entry
            .assignment
            .as_ref()
            .and_then(|a| nonce_from_tags(&a.tags));
        Ok(from_assignment.or_else(|| entry.message.as_ref().and_then(|m| nonce_from_tags(&m.tags))))
    }
}

#[async_trait]
impl CheckpointRegistry for HttpSources {
    async fn checkpoint_page(
        &self,
        process_id: &str,
        page_size: usize,
        after: Option<String>,
    ) -> TransportResult<CheckpointPage> {
        let client = self.graphql.clone();
        let process_id = process_id.to_string();
        let label = client.endpoint().to_string();
        self.blocking(label, move || {
            client.fetch_checkpoint_page(&process_id, page_size, after.as_deref())
        })
        .await
    }

    async fn transaction_tags(&self, tx_id: &str) -> TransportResult<Option<Vec<Tag>>> {
        let client = self.graphql.clone();
        let tx_id = tx_id.to_string();
        let label = client.endpoint().to_string();
        self.blocking(label, move || client.fetch_transaction_tags(&tx_id))
            .await
    }
}

#[async_trait]
impl CheckpointBlobSource for HttpSources {
    async fn fetch_blob(&self, tx_id: &str) -> TransportResult<Vec<u8>> {
        let client = self.gateway.clone();
        let tx_id = tx_id.to_string();
        let label = client.data_url(&tx_id);
        self.blocking(label, move || client.fetch_data(&tx_id)).await
    }
}

#[async_trait]
impl LiveStateSource for HttpSources {
    async fn fetch_live(&self, process_id: &str) -> TransportResult<RawLiveState> {
        let client = self.state.clone();
        let process_id = process_id.to_string();
        let label = client.state_url(&process_id);
        self.blocking(label, move || client.fetch_state(&process_id))
            .await
    }
}

#[async_trait]
impl ProcessDirectory for HttpSources {
    async fn transaction(&self, tx_id: &str) -> TransportResult<Option<TransactionNode>> {
        let client = self.graphql.clone();
        let tx_id = tx_id.to_string();
        let label = client.endpoint().to_string();
        self.blocking(label, move || client.fetch_transaction(&tx_id))
            .await
    }
}
