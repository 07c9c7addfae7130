//! Execution results.

use crate::replica::StateBlob;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Effect of applying one message to one state blob.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayResult {
    pub state: StateBlob,
    pub output: Value,
    pub messages: Vec<Value>,
    pub spawns: Vec<Value>,
    pub assignments: Vec<Value>,
    /// Error reported by the process itself; the new state is still valid.
    pub error: Option<String>,
    pub gas_used: u64,
}

impl ReplayResult {
    /// Result carrying only a new state and no effects.
    pub fn with_state(state: StateBlob) -> Self {
        Self {
            state,
            output: Value::Null,
            messages: Vec::new(),
            spawns: Vec::new(),
            assignments: Vec::new(),
            error: None,
            gas_used: 0,
        }
    }

    /// Drop the new state, keeping the effects.
    pub fn into_speculative(self, snapshot_nonce: i64, isolated: bool) -> SpeculativeOutcome {
        SpeculativeOutcome {
            output: self.output,
            messages: self.messages,
            spawns: self.spawns,
            assignments: self.assignments,
            error: self.error,
            gas_used: self.gas_used,
            snapshot_nonce,
            isolated,
        }
    }
}

/// What a speculative execution returns to its caller. Never carries state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpeculativeOutcome {
    pub output: Value,
    pub messages: Vec<Value>,
    pub spawns: Vec<Value>,
    pub assignments: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub gas_used: u64,
    /// Nonce of the state the run was evaluated against (`-1` when empty).
    pub snapshot_nonce: i64,
    /// `false` when the run fell back to the uncopied authoritative state.
    pub isolated: bool,
}
