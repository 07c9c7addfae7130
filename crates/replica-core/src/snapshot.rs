//! Snapshot isolation for speculative (dry-run) execution.
//!
//! Speculative runs never see the authoritative blob itself: they run
//! against a deep copy of the dry-run snapshot, or of the authoritative
//! state when no snapshot has been taken. The snapshot is refreshed only
//! on request. If a copy cannot be allocated the run degrades to the
//! uncopied state, with a warning and `isolated: false` in the outcome.

use crate::coordinator::ReplayCoordinator;
use crate::error::{ReplicaError, Result, ValidationError};
use parking_lot::Mutex;
use replica_types::{
    signed_nonce, Message, ProcessEnvironment, ReplayResult, SpeculativeOutcome, StateBlob, Tag,
    Tags,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Message id given to requests that carry none.
pub const DEFAULT_MESSAGE_ID: &str = "MESSAGE_ID";

// =============================================================================
// Request
// =============================================================================

/// Inbound dry-run body. `Target` and `Tags` are required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DryRunRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    /// Non-string data is kept as its JSON text.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub anchor: Option<String>,
    /// A `[{name, value}]` list or a flat `{name: value}` object.
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Option<Vec<Tag>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsInput {
    List(Vec<Tag>),
    Map(serde_json::Map<String, Value>),
}

fn deserialize_tags<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Tag>>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<TagsInput>::deserialize(deserializer)?;
    Ok(input.map(|input| match input {
        TagsInput::List(list) => list,
        TagsInput::Map(map) => map
            .into_iter()
            .map(|(name, value)| Tag::new(name, json_text(value)))
            .collect(),
    }))
}

fn json_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Replica position a request is evaluated at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub nonce: u64,
    pub timestamp: u64,
    pub block_height: u64,
}

impl DryRunRequest {
    /// Build the message the engine sees. Deterministic for a given
    /// request, position and environment.
    pub fn into_message(
        self,
        position: Position,
        env: &ProcessEnvironment,
    ) -> std::result::Result<Message, ValidationError> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE_ID.to_string());
        let target = self
            .target
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ValidationError::new(0, Some(&id), "'Target' is required"))?;
        let tags = self
            .tags
            .ok_or_else(|| ValidationError::new(0, Some(&id), "'Tags' is required"))?;
        let owner = self
            .owner
            .or_else(|| env.process.owner.clone())
            .unwrap_or_else(|| env.process_id().to_string());
        let from = self.from.unwrap_or_else(|| owner.clone());

        Ok(Message {
            id,
            nonce: position.nonce,
            epoch: None,
            timestamp: position.timestamp,
            block_height: position.block_height,
            owner,
            target,
            from,
            data: self.data.map(json_text),
            anchor: self.anchor,
            hash_chain: None,
            cron: false,
            is_assignment: false,
            deep_hash: None,
            tags: Tags::new(tags),
        })
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Deep copy of the authoritative state at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    pub state: StateBlob,
    pub last_processed_nonce: Option<u64>,
    pub timestamp: Option<u64>,
    pub block_height: Option<u64>,
}

impl Snapshot {
    fn position(&self) -> Position {
        Position {
            nonce: self.last_processed_nonce.map_or(0, |n| n.saturating_add(1)),
            timestamp: self.timestamp.unwrap_or_default(),
            block_height: self.block_height.unwrap_or_default(),
        }
    }
}

pub struct SnapshotManager {
    coordinator: Arc<ReplayCoordinator>,
    snapshot: Mutex<Option<Arc<Snapshot>>>,
}

impl SnapshotManager {
    pub fn new(coordinator: Arc<ReplayCoordinator>) -> Self {
        Self {
            coordinator,
            snapshot: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<ReplayCoordinator> {
        &self.coordinator
    }

    /// Nonce of the current snapshot (`-1` when empty); `None` if none was taken.
    pub fn snapshot_nonce(&self) -> Option<i64> {
        self.snapshot
            .lock()
            .as_ref()
            .map(|s| signed_nonce(s.last_processed_nonce))
    }

    /// Replace the snapshot with a fresh deep copy of the authoritative state.
    ///
    /// On allocation failure the previous snapshot is kept.
    pub async fn refresh_snapshot(&self) -> Result<i64> {
        let snapshot = {
            let replica = self.coordinator.replica().await;
            let state = replica.state().try_clone().map_err(|e| {
                warn!(error = %e, "snapshot refresh failed, keeping previous snapshot");
                ReplicaError::Snapshot(e.to_string())
            })?;
            Snapshot {
                state,
                last_processed_nonce: replica.last_processed_nonce(),
                timestamp: replica.last_timestamp(),
                block_height: replica.last_block_height(),
            }
        };
        let nonce = signed_nonce(snapshot.last_processed_nonce);
        *self.snapshot.lock() = Some(Arc::new(snapshot));
        info!(snapshot_nonce = nonce, "dry-run snapshot refreshed");
        Ok(nonce)
    }

    /// Evaluate `request` without touching authoritative state.
    pub async fn speculate(&self, request: DryRunRequest) -> Result<SpeculativeOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("speculative", %run_id);
        self.coordinator.metrics().speculative_runs.inc();
        self.speculate_inner(request).instrument(span).await
    }

    async fn speculate_inner(&self, request: DryRunRequest) -> Result<SpeculativeOutcome> {
        let env = self.coordinator.environment();
        if let Some(target) = request.target.as_deref() {
            if target != env.process_id() {
                warn!(
                    target,
                    process_id = env.process_id(),
                    "dry-run target differs from the replicated process"
                );
            }
        }

        let snapshot = self.snapshot.lock().clone();
        if let Some(snapshot) = snapshot {
            let message = request.into_message(snapshot.position(), &env)?;
            let nonce = signed_nonce(snapshot.last_processed_nonce);
            return match snapshot.state.try_clone() {
                Ok(copy) => self.run(&copy, &message, &env, nonce, true).await,
                Err(e) => {
                    warn!(error = %e, "snapshot copy failed, running against the shared snapshot");
                    self.run(&snapshot.state, &message, &env, nonce, false).await
                }
            };
        }

        let replica = self.coordinator.replica().await;
        let position = Position {
            nonce: replica.next_nonce(),
            timestamp: replica.last_timestamp().unwrap_or_default(),
            block_height: replica.last_block_height().unwrap_or_default(),
        };
        let nonce = signed_nonce(replica.last_processed_nonce());
        let message = request.into_message(position, &env)?;
        let copied = replica.state().try_clone();
        match copied {
            Ok(copy) => {
                drop(replica);
                self.run(&copy, &message, &env, nonce, true).await
            }
            Err(e) => {
                warn!(error = %e, "state copy failed, running against the authoritative state");
                self.run(replica.state(), &message, &env, nonce, false).await
            }
        }
    }

    async fn run(
        &self,
        state: &StateBlob,
        message: &Message,
        env: &ProcessEnvironment,
        snapshot_nonce: i64,
        isolated: bool,
    ) -> Result<SpeculativeOutcome> {
        let result = self
            .coordinator
            .engine()
            .apply(state, message, env)
            .await
            .map_err(|e| ReplicaError::Apply {
                nonce: message.nonce,
                message_id: message.id.clone(),
                reason: format!("{e:#}"),
            })?;
        Ok(result.into_speculative(snapshot_nonce, isolated))
    }

    /// Write mode: evaluate `request` against the authoritative state and commit.
    pub async fn execute_authoritative(&self, request: DryRunRequest) -> Result<ReplayResult> {
        let env = self.coordinator.environment();
        let position = {
            let replica = self.coordinator.replica().await;
            Position {
                nonce: replica.next_nonce(),
                timestamp: replica.last_timestamp().unwrap_or_default(),
                block_height: replica.last_block_height().unwrap_or_default(),
            }
        };
        let message = request.into_message(position, &env)?;
        self.coordinator.submit_authoritative(message).await
    }
}
