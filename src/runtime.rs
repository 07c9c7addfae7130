//! Wiring of the real HTTP collaborators.

use anyhow::{Context, Result};
use replica_core::{
    HttpSources, JsonFoldEngine, ReplayCoordinator, ReplicaConfig, ReplicaSources,
};
use std::sync::Arc;
use tracing::info;

/// Coordinator backed by the configured endpoints and the JSON reference engine.
pub fn build_coordinator(config: ReplicaConfig) -> Result<Arc<ReplayCoordinator>> {
    config.validate()?;
    info!(
        process_id = %config.process_id,
        sequencer = %config.endpoints.sequencer,
        graphql = %config.endpoints.graphql,
        cache_root = %config.cache_root.display(),
        "building replica"
    );
    let sources = ReplicaSources::http(HttpSources::new(
        &config.endpoints,
        config.request_timeout,
        config.connect_timeout,
    ));
    let coordinator = ReplayCoordinator::new(config, sources, Arc::new(JsonFoldEngine))
        .context("failed to construct replay coordinator")?;
    Ok(Arc::new(coordinator))
}
