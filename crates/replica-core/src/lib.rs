//! Local replica of a remote AO process.
//!
//! The [`ReplayCoordinator`] bootstraps a [`replica_types::ProcessReplica`]
//! from the best available source, then keeps it in step with the
//! sequencer by applying log entries strictly in nonce order through an
//! [`ExecutionEngine`]. The [`SnapshotManager`] answers speculative
//! (dry-run) requests against an isolated copy of the state.
//!
//! # Layers
//!
//! | module | role |
//! |--------|------|
//! | [`source`] | async traits over the remote services, plus [`HttpSources`] |
//! | [`normalize`], [`fetcher`] | sequencer pages to validated, ordered messages |
//! | [`locator`], [`loader`], [`live`] | checkpoint discovery, checkpoint and live-state loading |
//! | [`bootstrap`] | strategy chain (scratch, explicit checkpoint, live state, auto checkpoint, empty) |
//! | [`coordinator`] | bootstrap, catch-up, poll, full refresh, health |
//! | [`scheduler`] | jittered poll timer and refresh timer |
//! | [`snapshot`] | dry-run snapshot and speculative execution |
//!
//! # Example
//!
//! ```ignore
//! use replica_core::{
//!     spawn_scheduler, HttpSources, JsonFoldEngine, ReplayCoordinator, ReplicaConfig,
//!     ReplicaSources,
//! };
//! use std::sync::Arc;
//!
//! let config = ReplicaConfig::new("PROCESS_ID").with_auto_checkpoint();
//! let sources = ReplicaSources::http(HttpSources::new(
//!     &config.endpoints,
//!     config.request_timeout,
//!     config.connect_timeout,
//! ));
//! let coordinator = Arc::new(ReplayCoordinator::new(config, sources, Arc::new(JsonFoldEngine))?);
//! coordinator.bootstrap().await?;
//! let scheduler = spawn_scheduler(coordinator.clone());
//! ```

pub mod activity;
pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod environment;
pub mod error;
pub mod fetcher;
pub mod health;
pub mod ledger;
pub mod live;
pub mod loader;
pub mod locator;
pub mod metrics;
pub mod normalize;
pub mod scheduler;
pub mod snapshot;
pub mod source;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use activity::{Activity, ActivityGate};
pub use bootstrap::{plan_chain, select_plan, BootstrapOutcome, BootstrapPlan};
pub use config::ReplicaConfig;
pub use coordinator::{
    BootstrapReport, CatchUpReport, PassReport, Phase, RefreshOutcome, ReplayCoordinator,
    ReplicaSources, SkipReason, StopReason, TickOutcome,
};
pub use engine::{ExecutionEngine, JsonFoldEngine};
pub use environment::resolve_environment;
pub use error::{ErrorKind, ReplicaError, Result, ValidationError};
pub use fetcher::MessageFetcher;
pub use health::{HealthReport, HealthStatus};
pub use ledger::EvaluationLedger;
pub use live::{LiveState, LiveStateLoader};
pub use loader::{CheckpointLoader, PreparedCheckpoint};
pub use locator::CheckpointLocator;
pub use metrics::ReplicaMetrics;
pub use normalize::NormalizedBatch;
pub use scheduler::{jittered, spawn_scheduler, SchedulerHandle};
pub use snapshot::{DryRunRequest, SnapshotManager};
pub use source::{
    CheckpointBlobSource, CheckpointRegistry, HttpSources, LiveStateSource, ProcessDirectory,
    Sequencer,
};
