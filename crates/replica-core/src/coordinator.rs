//! The replay coordinator: bootstrap, ordered apply, poll and refresh.
//!
//! One coordinator owns one [`ProcessReplica`]. Three activities may touch
//! it (bootstrap, full refresh and poll) and they never overlap: each
//! claims the [`ActivityGate`] without waiting and gives up if it is
//! taken. Within an activity messages are applied strictly in nonce order
//! and a failed apply ends the batch, so a retry always resumes at the
//! nonce that failed.
//!
//! ```ignore
//! let coordinator = ReplayCoordinator::new(config, sources, Arc::new(JsonFoldEngine))?;
//! let report = coordinator.bootstrap().await?;
//! loop {
//!     coordinator.poll_once().await;
//! }
//! ```

use crate::activity::{Activity, ActivityGate};
use crate::bootstrap::{BootstrapPlan, Bootstrapper};
use crate::config::ReplicaConfig;
use crate::engine::ExecutionEngine;
use crate::environment::resolve_environment;
use crate::error::{ReplicaError, Result};
use crate::fetcher::MessageFetcher;
use crate::health::{HealthReport, HealthStatus};
use crate::ledger::EvaluationLedger;
use crate::live::LiveStateLoader;
use crate::loader::CheckpointLoader;
use crate::locator::CheckpointLocator;
use crate::metrics::ReplicaMetrics;
use crate::source::{
    CheckpointBlobSource, CheckpointRegistry, HttpSources, LiveStateSource, ProcessDirectory,
    Sequencer,
};
use parking_lot::{Mutex, RwLock};
use replica_cache::ReplicaCache;
use replica_types::{
    signed_nonce, BootstrapSource, Checkpoint, Message, ProcessEnvironment, ProcessReplica,
    ReplayResult, StateBlob,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// =============================================================================
// Wiring
// =============================================================================

/// Every remote collaborator the coordinator needs.
#[derive(Clone)]
pub struct ReplicaSources {
    pub sequencer: Arc<dyn Sequencer>,
    pub registry: Arc<dyn CheckpointRegistry>,
    pub blobs: Arc<dyn CheckpointBlobSource>,
    pub live: Arc<dyn LiveStateSource>,
    pub directory: Arc<dyn ProcessDirectory>,
}

impl ReplicaSources {
    /// All collaborators served by one set of HTTP clients.
    pub fn http(sources: HttpSources) -> Self {
        let shared = Arc::new(sources);
        Self {
            sequencer: shared.clone(),
            registry: shared.clone(),
            blobs: shared.clone(),
            live: shared.clone(),
            directory: shared,
        }
    }
}

/// Coarse lifecycle; the loading and polling sub-states live in the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Bootstrapping,
    Idle,
    /// An explicit checkpoint could not be loaded. Terminal.
    Halted,
}

// =============================================================================
// Reports
// =============================================================================

/// What one apply pass did.
#[derive(Debug, Default)]
pub struct PassReport {
    pub fetched: usize,
    pub applied: usize,
    /// Stale or already evaluated entries the cursor moved past.
    pub skipped: usize,
    /// The page was full, so more entries are likely waiting.
    pub has_more: bool,
    pub limit_reached: bool,
    /// Apply failure that ended the batch.
    pub failure: Option<ReplicaError>,
    pub last_processed_nonce: Option<u64>,
}

#[derive(Debug)]
pub enum StopReason {
    /// The sequencer has nothing more right now.
    Drained,
    LimitReached,
    /// A pass fetched entries but could not move the cursor.
    NoProgress,
    Failed(ReplicaError),
}

#[derive(Debug)]
pub struct CatchUpReport {
    pub passes: usize,
    pub applied: usize,
    pub skipped: usize,
    pub stop: StopReason,
}

#[derive(Debug)]
pub struct BootstrapReport {
    pub source: BootstrapSource,
    pub nonce: Option<u64>,
    pub checkpoint: Option<Checkpoint>,
    /// `None` when catch-up was not attempted.
    pub catch_up: Option<CatchUpReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Busy,
    Halted,
    NotReady,
    LimitReached,
    Disabled,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Busy => "busy",
            SkipReason::Halted => "halted",
            SkipReason::NotReady => "not_ready",
            SkipReason::LimitReached => "limit",
            SkipReason::Disabled => "disabled",
        }
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Completed(PassReport),
    Failed(ReplicaError),
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Skipped(SkipReason),
    Adopted { previous: Option<u64>, nonce: u64 },
    /// The reported nonce did not move the replica forward.
    Ignored { reported: Option<u64>, current: Option<u64> },
    Failed(ReplicaError),
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct ReplayCoordinator {
    config: ReplicaConfig,
    fetcher: MessageFetcher,
    locator: CheckpointLocator,
    loader: CheckpointLoader,
    live: LiveStateLoader,
    directory: Arc<dyn ProcessDirectory>,
    engine: Arc<dyn ExecutionEngine>,
    env: RwLock<ProcessEnvironment>,
    replica: tokio::sync::RwLock<ProcessReplica>,
    gate: ActivityGate,
    phase: RwLock<Phase>,
    ledger: Mutex<EvaluationLedger>,
    metrics: ReplicaMetrics,
}

impl ReplayCoordinator {
    pub fn new(
        config: ReplicaConfig,
        sources: ReplicaSources,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;
        let cache = ReplicaCache::open(config.cache_root.clone()).map_err(ReplicaError::cache)?;
        let metrics = ReplicaMetrics::new(&config.process_id)
            .map_err(|e| ReplicaError::Configuration(format!("metrics registry: {e}")))?;

        Ok(Self {
            fetcher: MessageFetcher::new(sources.sequencer, config.message_page_size),
            locator: CheckpointLocator::new(sources.registry.clone(), config.checkpoint_page_size),
            loader: CheckpointLoader::new(
                sources.blobs,
                sources.registry,
                cache.checkpoints().clone(),
            ),
            live: LiveStateLoader::new(sources.live, cache.live().clone()),
            directory: sources.directory,
            engine,
            env: RwLock::new(ProcessEnvironment::unresolved(&config.process_id)),
            replica: tokio::sync::RwLock::new(ProcessReplica::new(
                &config.process_id,
                config.forward_limit,
            )),
            gate: ActivityGate::new(),
            phase: RwLock::new(Phase::Uninitialized),
            ledger: Mutex::new(EvaluationLedger::default()),
            metrics,
            config,
        })
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn process_id(&self) -> &str {
        &self.config.process_id
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    pub fn metrics(&self) -> &ReplicaMetrics {
        &self.metrics
    }

    pub fn environment(&self) -> ProcessEnvironment {
        self.env.read().clone()
    }

    pub fn engine(&self) -> &Arc<dyn ExecutionEngine> {
        &self.engine
    }

    pub fn locator(&self) -> &CheckpointLocator {
        &self.locator
    }

    /// Shared read access to the authoritative replica.
    pub async fn replica(&self) -> tokio::sync::RwLockReadGuard<'_, ProcessReplica> {
        self.replica.read().await
    }

    pub async fn last_processed_nonce(&self) -> Option<u64> {
        self.replica.read().await.last_processed_nonce()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.write() = phase;
    }

    fn ready(&self) -> std::result::Result<(), SkipReason> {
        match self.phase() {
            Phase::Idle => Ok(()),
            Phase::Halted => Err(SkipReason::Halted),
            Phase::Uninitialized | Phase::Bootstrapping => Err(SkipReason::NotReady),
        }
    }

    fn skipped(&self, reason: SkipReason, activity: Activity) {
        self.metrics.skipped(reason.as_str());
        debug!(
            process_id = %self.config.process_id,
            %activity,
            reason = reason.as_str(),
            "tick skipped"
        );
    }

    // -------------------------------------------------------------------------
    // Bootstrap
    // -------------------------------------------------------------------------

    /// Establish the initial state and catch up to the head (or the limit).
    ///
    /// An explicit checkpoint that cannot be loaded halts the coordinator
    /// for good. Catch-up failures are reported but leave it idle, ready
    /// for the scheduler to retry.
    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        let Some(_guard) = self.gate.try_begin(Activity::Bootstrap) else {
            return Err(ReplicaError::Busy(
                self.gate.current().unwrap_or(Activity::Bootstrap),
            ));
        };
        match self.phase() {
            Phase::Halted => {
                return Err(ReplicaError::Halted(
                    "explicit checkpoint could not be loaded".into(),
                ))
            }
            Phase::Idle => {
                return Err(ReplicaError::Configuration(
                    "replica is already bootstrapped".into(),
                ))
            }
            Phase::Uninitialized | Phase::Bootstrapping => {}
        }
        self.set_phase(Phase::Bootstrapping);
        let process_id = self.config.process_id.as_str();

        let env = resolve_environment(
            self.directory.as_ref(),
            process_id,
            self.config.module_id.as_deref(),
        )
        .await;
        *self.env.write() = env;

        let bootstrapper = Bootstrapper {
            fetcher: &self.fetcher,
            locator: &self.locator,
            loader: &self.loader,
            live: &self.live,
        };
        let outcome = match bootstrapper.run(&self.config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.set_phase(Phase::Halted);
                error!(process_id, error = %e, "bootstrap halted");
                return Err(e);
            }
        };

        let source = outcome.source();
        let skip_catch_up = outcome.plan == BootstrapPlan::Empty;
        let limit_reached = {
            let mut replica = self.replica.write().await;
            replica.install(outcome.state, outcome.nonce, outcome.timestamp, source);
            replica.limit_reached()
        };
        self.ledger.lock().clear();
        self.metrics
            .last_processed_nonce
            .set(signed_nonce(outcome.nonce));
        info!(
            process_id,
            source = source.as_str(),
            last_processed_nonce = signed_nonce(outcome.nonce),
            "replica bootstrapped"
        );

        let catch_up = if skip_catch_up {
            None
        } else if limit_reached {
            info!(process_id, "forward limit already reached, skipping catch-up");
            None
        } else {
            Some(self.catch_up_locked().await)
        };
        self.set_phase(Phase::Idle);

        Ok(BootstrapReport {
            source,
            nonce: self.last_processed_nonce().await,
            checkpoint: outcome.checkpoint,
            catch_up,
        })
    }

    /// Apply passes until the log is drained, the limit is hit, or a pass fails.
    /// Caller holds the gate.
    async fn catch_up_locked(&self) -> CatchUpReport {
        let process_id = self.config.process_id.as_str();
        let mut report = CatchUpReport {
            passes: 0,
            applied: 0,
            skipped: 0,
            stop: StopReason::Drained,
        };
        loop {
            let cursor_before = self.last_processed_nonce().await;
            let pass = match self.apply_pass().await {
                Ok(pass) => pass,
                Err(e) => {
                    warn!(process_id, error = %e, "catch-up pass failed");
                    report.stop = StopReason::Failed(e);
                    break;
                }
            };
            report.passes += 1;
            report.applied += pass.applied;
            report.skipped += pass.skipped;

            if let Some(failure) = pass.failure {
                report.stop = StopReason::Failed(failure);
                break;
            }
            if pass.limit_reached {
                report.stop = StopReason::LimitReached;
                break;
            }
            if !pass.has_more {
                report.stop = StopReason::Drained;
                break;
            }
            // Only a moving cursor counts; a page of stale entries does not.
            if pass.last_processed_nonce == cursor_before {
                report.stop = StopReason::NoProgress;
                break;
            }
        }
        info!(
            process_id,
            passes = report.passes,
            applied = report.applied,
            skipped = report.skipped,
            stop = ?report.stop,
            "catch-up finished"
        );
        report
    }

    // -------------------------------------------------------------------------
    // Apply loop
    // -------------------------------------------------------------------------

    /// Fetch one page after the cursor and apply it in order. Caller holds the gate.
    async fn apply_pass(&self) -> Result<PassReport> {
        let process_id = self.config.process_id.as_str();
        let (from_nonce, forward_limit) = {
            let replica = self.replica.read().await;
            if replica.limit_reached() {
                return Ok(PassReport {
                    limit_reached: true,
                    last_processed_nonce: replica.last_processed_nonce(),
                    ..PassReport::default()
                });
            }
            (replica.next_nonce(), replica.forward_limit())
        };

        let batch = match self.fetcher.fetch(process_id, from_nonce, forward_limit).await {
            Ok(batch) => batch,
            Err(e) => {
                if matches!(e, ReplicaError::Validation(_)) {
                    self.metrics.validation_failures.inc();
                }
                return Err(e);
            }
        };
        self.metrics.batches_fetched.inc();

        let env = self.environment();
        let mut report = PassReport {
            fetched: batch.len(),
            ..PassReport::default()
        };
        let mut stopped_early = false;

        for message in &batch.messages {
            let replica = self.replica.read().await;
            if message.nonce < replica.next_nonce() {
                debug!(process_id, nonce = message.nonce, "skipping stale entry");
                report.skipped += 1;
                continue;
            }
            if !replica.within_limit(message.nonce) {
                debug!(process_id, nonce = message.nonce, "entry is past the forward limit");
                stopped_early = true;
                break;
            }
            let evaluated = message
                .evaluation_key()
                .is_some_and(|key| self.ledger.lock().contains(&key));
            if evaluated {
                drop(replica);
                self.replica.write().await.skip_to(message.nonce);
                debug!(process_id, nonce = message.nonce, "skipping evaluated entry");
                report.skipped += 1;
                continue;
            }

            let applied = self.engine.apply(replica.state(), message, &env).await;
            drop(replica);
            match applied {
                Ok(result) => {
                    self.note_process_error(message, &result);
                    let limit_reached = self.commit(message, result.state).await;
                    report.applied += 1;
                    if limit_reached {
                        report.limit_reached = true;
                        break;
                    }
                }
                Err(e) => {
                    self.metrics.apply_failures.inc();
                    let err = ReplicaError::Apply {
                        nonce: message.nonce,
                        message_id: message.id.clone(),
                        reason: format!("{e:#}"),
                    };
                    warn!(process_id, nonce = message.nonce, error = %err, "apply failed, ending batch");
                    report.failure = Some(err);
                    stopped_early = true;
                    break;
                }
            }
        }

        report.has_more = !stopped_early
            && !report.limit_reached
            && (batch.has_next_page || batch.len() >= self.fetcher.page_size());
        report.last_processed_nonce = self.last_processed_nonce().await;
        Ok(report)
    }

    fn note_process_error(&self, message: &Message, result: &ReplayResult) {
        if let Some(process_error) = &result.error {
            debug!(
                process_id = %self.config.process_id,
                nonce = message.nonce,
                error = %process_error,
                "process reported an error"
            );
        }
    }

    /// Commit an applied message; returns whether the forward limit is now reached.
    async fn commit(&self, message: &Message, state: StateBlob) -> bool {
        let mut replica = self.replica.write().await;
        if replica.commit(state, message.nonce, message.timestamp, message.block_height) {
            if let Some(key) = message.evaluation_key() {
                self.ledger.lock().record(key);
            }
            self.metrics.messages_applied.inc();
            self.metrics.last_processed_nonce.set(message.nonce as i64);
            debug!(
                process_id = %self.config.process_id,
                nonce = message.nonce,
                message_id = %message.id,
                "message applied"
            );
        }
        replica.limit_reached()
    }

    // -------------------------------------------------------------------------
    // Scheduled activities
    // -------------------------------------------------------------------------

    /// One poll: a single apply pass from the cursor, unless something else
    /// is running, the replica is not ready, or the limit has been reached.
    pub async fn poll_once(&self) -> TickOutcome {
        if let Err(reason) = self.ready() {
            self.skipped(reason, Activity::Polling);
            return TickOutcome::Skipped(reason);
        }
        if self.replica.read().await.limit_reached() {
            self.skipped(SkipReason::LimitReached, Activity::Polling);
            return TickOutcome::Skipped(SkipReason::LimitReached);
        }
        let Some(_guard) = self.gate.try_begin(Activity::Polling) else {
            self.skipped(SkipReason::Busy, Activity::Polling);
            return TickOutcome::Skipped(SkipReason::Busy);
        };
        match self.apply_pass().await {
            Ok(report) => {
                if report.applied > 0 {
                    info!(
                        process_id = %self.config.process_id,
                        applied = report.applied,
                        last_processed_nonce = signed_nonce(report.last_processed_nonce),
                        "poll applied messages"
                    );
                }
                TickOutcome::Completed(report)
            }
            Err(e) => {
                warn!(process_id = %self.config.process_id, error = %e, "poll failed");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Reload live state and adopt it only if it moves the replica forward.
    pub async fn full_refresh(&self) -> RefreshOutcome {
        if !self.config.full_refresh_enabled() {
            return RefreshOutcome::Skipped(SkipReason::Disabled);
        }
        if let Err(reason) = self.ready() {
            self.skipped(reason, Activity::FullRefresh);
            return RefreshOutcome::Skipped(reason);
        }
        let Some(_guard) = self.gate.try_begin(Activity::FullRefresh) else {
            self.skipped(SkipReason::Busy, Activity::FullRefresh);
            return RefreshOutcome::Skipped(SkipReason::Busy);
        };
        let process_id = self.config.process_id.as_str();

        let live = match self.live.load(process_id).await {
            Ok(live) => live,
            Err(e) => {
                warn!(process_id, error = %e, "full refresh failed");
                return RefreshOutcome::Failed(e);
            }
        };

        let mut replica = self.replica.write().await;
        let current = replica.last_processed_nonce();
        let Some(nonce) = live.nonce else {
            return RefreshOutcome::Ignored {
                reported: None,
                current,
            };
        };
        if !replica.within_limit(nonce) {
            debug!(process_id, nonce, "refreshed state is past the forward limit, ignoring");
            return RefreshOutcome::Ignored {
                reported: Some(nonce),
                current,
            };
        }
        if !replica.ratchet(live.blob, nonce, live.timestamp) {
            debug!(
                process_id,
                nonce,
                current = signed_nonce(current),
                "refreshed state is not newer, ignoring"
            );
            return RefreshOutcome::Ignored {
                reported: Some(nonce),
                current,
            };
        }
        drop(replica);

        self.ledger.lock().clear();
        self.metrics.refreshes_adopted.inc();
        self.metrics.last_processed_nonce.set(nonce as i64);
        info!(
            process_id,
            previous = signed_nonce(current),
            nonce,
            "full refresh adopted newer state"
        );
        RefreshOutcome::Adopted {
            previous: current,
            nonce,
        }
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Apply one message to the authoritative state and commit it.
    ///
    /// Takes the polling slot, so it fails with [`ReplicaError::Busy`]
    /// rather than waiting when another activity is running. The returned
    /// result carries the effects; the new state stays in the replica.
    pub async fn submit_authoritative(&self, message: Message) -> Result<ReplayResult> {
        match self.ready() {
            Ok(()) => {}
            Err(SkipReason::Halted) => {
                return Err(ReplicaError::Halted(
                    "explicit checkpoint could not be loaded".into(),
                ))
            }
            Err(_) => return Err(ReplicaError::NotReady),
        }
        let Some(_guard) = self.gate.try_begin(Activity::Polling) else {
            return Err(ReplicaError::Busy(
                self.gate.current().unwrap_or(Activity::Polling),
            ));
        };

        let env = self.environment();
        let replica = self.replica.read().await;
        let reject = |reason: String| ReplicaError::Apply {
            nonce: message.nonce,
            message_id: message.id.clone(),
            reason,
        };
        if message.nonce < replica.next_nonce() {
            return Err(reject(format!(
                "nonce does not advance past {}",
                signed_nonce(replica.last_processed_nonce())
            )));
        }
        if !replica.within_limit(message.nonce) {
            return Err(reject("nonce is past the forward limit".into()));
        }
        let applied = self.engine.apply(replica.state(), &message, &env).await;
        drop(replica);

        let mut result = match applied {
            Ok(result) => result,
            Err(e) => {
                self.metrics.apply_failures.inc();
                return Err(reject(format!("{e:#}")));
            }
        };
        self.note_process_error(&message, &result);
        let state = std::mem::replace(&mut result.state, StateBlob::empty());
        self.commit(&message, state).await;
        Ok(result)
    }

    pub async fn health(&self) -> HealthReport {
        let (last_processed_nonce, bootstrap_source) = {
            let replica = self.replica.read().await;
            (
                signed_nonce(replica.last_processed_nonce()),
                replica.bootstrap_source(),
            )
        };
        let (status, message) = match self.phase() {
            Phase::Halted => (
                HealthStatus::Halted,
                "replica halted: explicit checkpoint could not be loaded",
            ),
            Phase::Uninitialized | Phase::Bootstrapping => {
                (HealthStatus::Initializing, "replica not yet initialized")
            }
            Phase::Idle => match self.gate.current() {
                Some(activity) if activity.is_loading() => (
                    HealthStatus::BusyLoadingState,
                    "replica is performing a full state load",
                ),
                Some(_) => (
                    HealthStatus::BusyPollingMessages,
                    "replica is polling for new messages",
                ),
                None => (HealthStatus::Ok, "replica initialized and idle"),
            },
        };
        HealthReport {
            status,
            message: message.to_string(),
            last_processed_nonce,
            bootstrap_source,
        }
    }
}
