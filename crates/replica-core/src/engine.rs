//! Execution engine contract and a reference implementation.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use replica_types::{Message, ProcessEnvironment, ReplayResult, StateBlob};
use serde_json::{json, Map, Value};

/// Applies one message to one state blob.
///
/// Implementations must be deterministic: the same state, message and
/// environment always produce the same result. An `Err` means the message
/// could not be evaluated at all and stops the batch; a process-level
/// failure belongs in [`ReplayResult::error`] alongside a valid new state.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn apply(
        &self,
        state: &StateBlob,
        message: &Message,
        env: &ProcessEnvironment,
    ) -> anyhow::Result<ReplayResult>;
}

/// Deterministic engine folding messages into a JSON document.
///
/// The state is a JSON object (an empty blob counts as `{}`). Every message
/// updates `lastMessageId`, `lastTimestamp`, `lastBlockHeight` and
/// `lastNonce`. Message data lands in `lastData`, parsed as JSON when it
/// is JSON. Assignments are recorded under `assignments`, deep-hash
/// messages under `deepHashData`, both keyed by message id.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFoldEngine;

impl JsonFoldEngine {
    pub fn new() -> Self {
        Self
    }

    fn decode(state: &StateBlob) -> anyhow::Result<Map<String, Value>> {
        if state.is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_slice(state.as_bytes()).context("state is not JSON")? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!(
                "state must be a JSON object, found {}",
                type_name(&other)
            )),
        }
    }

    fn fold(mut doc: Map<String, Value>, message: &Message) -> Map<String, Value> {
        let data = message.data.as_deref().map(|raw| {
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        });

        doc.insert("lastMessageId".into(), json!(message.id));
        doc.insert("lastTimestamp".into(), json!(message.timestamp));
        doc.insert("lastBlockHeight".into(), json!(message.block_height));
        doc.insert("lastNonce".into(), json!(message.nonce));
        if let Some(data) = &data {
            doc.insert("lastData".into(), data.clone());
        }

        let record = json!({
            "data": data,
            "timestamp": message.timestamp,
            "blockHeight": message.block_height,
        });
        if message.is_assignment {
            insert_keyed(&mut doc, "assignments", &message.id, record.clone());
        }
        if message.deep_hash.is_some() {
            insert_keyed(&mut doc, "deepHashData", &message.id, record);
        }
        doc
    }
}

fn insert_keyed(doc: &mut Map<String, Value>, section: &str, key: &str, value: Value) {
    let entry = doc
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(map) = entry {
        map.insert(key.to_string(), value);
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl ExecutionEngine for JsonFoldEngine {
    async fn apply(
        &self,
        state: &StateBlob,
        message: &Message,
        env: &ProcessEnvironment,
    ) -> anyhow::Result<ReplayResult> {
        let doc = Self::fold(Self::decode(state)?, message);
        let bytes = serde_json::to_vec(&doc).context("failed to encode state")?;
        Ok(ReplayResult {
            output: json!({
                "process": env.process_id(),
                "module": env.module_id(),
                "messageId": message.id,
                "nonce": message.nonce,
                "keys": doc.len(),
            }),
            ..ReplayResult::with_state(StateBlob::new(bytes))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::message;

    #[tokio::test]
    async fn test_fold_records_message_fields() {
        let engine = JsonFoldEngine::new();
        let env = ProcessEnvironment::unresolved("proc");
        let mut msg = message(3);
        msg.data = Some(r#"{"balance": 10}"#.into());

        let result = engine.apply(&StateBlob::empty(), &msg, &env).await.unwrap();
        let doc: Value = serde_json::from_slice(result.state.as_bytes()).unwrap();
        assert_eq!(doc["lastNonce"], 3);
        assert_eq!(doc["lastData"]["balance"], 10);
        assert_eq!(doc["assignments"][&msg.id]["data"]["balance"], 10);
        assert_eq!(result.output["nonce"], 3);
        assert_eq!(result.gas_used, 0);
    }

    #[tokio::test]
    async fn test_non_json_state_is_an_error() {
        let engine = JsonFoldEngine::new();
        let env = ProcessEnvironment::unresolved("proc");
        let err = engine
            .apply(&StateBlob::new(b"\x00wasm".to_vec()), &message(0), &env)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not JSON"));

        let err = engine
            .apply(&StateBlob::new(b"[1,2]".to_vec()), &message(0), &env)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[tokio::test]
    async fn test_fold_is_deterministic() {
        let engine = JsonFoldEngine::new();
        let env = ProcessEnvironment::unresolved("proc");
        let state = StateBlob::new(br#"{"seed":true}"#.to_vec());
        let a = engine.apply(&state, &message(1), &env).await.unwrap();
        let b = engine.apply(&state, &message(1), &env).await.unwrap();
        assert_eq!(a, b);
    }
}
