//! Prometheus metrics for one replica.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Counters and gauges in a private registry, one per coordinator.
#[derive(Clone)]
pub struct ReplicaMetrics {
    registry: Registry,
    pub messages_applied: IntCounter,
    pub apply_failures: IntCounter,
    pub batches_fetched: IntCounter,
    pub validation_failures: IntCounter,
    /// Labelled by reason: `busy`, `halted`, `limit`, `not_ready`.
    pub ticks_skipped: IntCounterVec,
    pub refreshes_adopted: IntCounter,
    pub speculative_runs: IntCounter,
    /// `-1` until the first message (or a bootstrap nonce) lands.
    pub last_processed_nonce: IntGauge,
}

impl ReplicaMetrics {
    pub fn new(process_id: &str) -> prometheus::Result<Self> {
        let registry =
            Registry::new_custom(Some("aos_replica".into()), Some(labels(process_id)))?;

        let messages_applied = IntCounter::new(
            "messages_applied_total",
            "Messages applied to authoritative state",
        )?;
        let apply_failures =
            IntCounter::new("apply_failures_total", "Messages the engine rejected")?;
        let batches_fetched =
            IntCounter::new("batches_fetched_total", "Sequencer pages fetched")?;
        let validation_failures = IntCounter::new(
            "validation_failures_total",
            "Sequencer pages rejected as malformed",
        )?;
        let ticks_skipped = IntCounterVec::new(
            Opts::new("ticks_skipped_total", "Scheduled ticks that did nothing"),
            &["reason"],
        )?;
        let refreshes_adopted = IntCounter::new(
            "full_refreshes_adopted_total",
            "Full refreshes that advanced the replica",
        )?;
        let speculative_runs =
            IntCounter::new("speculative_runs_total", "Dry-run executions")?;
        let last_processed_nonce = IntGauge::new(
            "last_processed_nonce",
            "Nonce of the last applied message",
        )?;
        last_processed_nonce.set(-1);

        registry.register(Box::new(messages_applied.clone()))?;
        registry.register(Box::new(apply_failures.clone()))?;
        registry.register(Box::new(batches_fetched.clone()))?;
        registry.register(Box::new(validation_failures.clone()))?;
        registry.register(Box::new(ticks_skipped.clone()))?;
        registry.register(Box::new(refreshes_adopted.clone()))?;
        registry.register(Box::new(speculative_runs.clone()))?;
        registry.register(Box::new(last_processed_nonce.clone()))?;

        Ok(Self {
            registry,
            messages_applied,
            apply_failures,
            batches_fetched,
            validation_failures,
            ticks_skipped,
            refreshes_adopted,
            speculative_runs,
            last_processed_nonce,
        })
    }

    pub fn skipped(&self, reason: &str) {
        self.ticks_skipped.with_label_values(&[reason]).inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

fn labels(process_id: &str) -> std::collections::HashMap<String, String> {
    std::iter::once(("process_id".to_string(), process_id.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_process_label() {
        let metrics = ReplicaMetrics::new("proc").unwrap();
        metrics.messages_applied.inc_by(3);
        metrics.skipped("busy");
        metrics.last_processed_nonce.set(2);

        let text = metrics.render();
        assert!(text.contains("aos_replica_messages_applied_total{process_id=\"proc\"} 3"));
        assert!(text.contains("aos_replica_last_processed_nonce{process_id=\"proc\"} 2"));
        assert!(text.contains("reason=\"busy\""));
    }
}
