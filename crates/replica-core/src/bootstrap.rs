//! Bootstrap strategy selection and execution.
//!
//! Strategies are pure evaluators over the configuration, tried in
//! priority order:
//!
//! | # | Strategy            | Applies when                              | On failure        |
//! |---|---------------------|-------------------------------------------|-------------------|
//! | 1 | scratch             | `load_from_scratch`                       | cannot fail       |
//! | 2 | explicit checkpoint | `checkpoint_tx_id` set                    | halt              |
//! | 3 | live state          | neither of the above                      | next strategy     |
//! | 4 | auto checkpoint     | `load_from_checkpoint`, no pin or scratch | next strategy     |
//! | 5 | empty               | always                                    | cannot fail       |
//!
//! Scratch and explicit checkpoint are exclusive: when either applies it is
//! the whole chain.

use crate::config::ReplicaConfig;
use crate::error::{ReplicaError, Result};
use crate::fetcher::MessageFetcher;
use crate::live::LiveStateLoader;
use crate::loader::CheckpointLoader;
use crate::locator::CheckpointLocator;
use replica_types::{BootstrapSource, Checkpoint, StateBlob};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapPlan {
    Scratch,
    ExplicitCheckpoint { tx_id: String },
    LiveState,
    /// Newest checkpoint at or below `max_nonce`, or the newest overall.
    AutoCheckpoint { max_nonce: Option<u64> },
    Empty,
}

impl BootstrapPlan {
    pub fn strategy(&self) -> &'static str {
        self.source().as_str()
    }

    pub fn source(&self) -> BootstrapSource {
        match self {
            BootstrapPlan::Scratch => BootstrapSource::Scratch,
            BootstrapPlan::ExplicitCheckpoint { .. } => BootstrapSource::ExplicitCheckpoint,
            BootstrapPlan::LiveState => BootstrapSource::LiveState,
            BootstrapPlan::AutoCheckpoint { .. } => BootstrapSource::AutoCheckpoint,
            BootstrapPlan::Empty => BootstrapSource::Empty,
        }
    }

    /// Exclusive plans leave no fallback behind them.
    pub fn is_exclusive(&self) -> bool {
        matches!(
            self,
            BootstrapPlan::Scratch | BootstrapPlan::ExplicitCheckpoint { .. }
        )
    }
}

type Evaluator = fn(&ReplicaConfig) -> Option<BootstrapPlan>;

const EVALUATORS: [Evaluator; 5] = [scratch, explicit_checkpoint, live_state, auto_checkpoint, empty];

fn scratch(config: &ReplicaConfig) -> Option<BootstrapPlan> {
    config.load_from_scratch.then_some(BootstrapPlan::Scratch)
}

fn explicit_checkpoint(config: &ReplicaConfig) -> Option<BootstrapPlan> {
    if config.load_from_scratch {
        return None;
    }
    config
        .checkpoint_tx_id
        .clone()
        .map(|tx_id| BootstrapPlan::ExplicitCheckpoint { tx_id })
}

fn live_state(config: &ReplicaConfig) -> Option<BootstrapPlan> {
    (!config.load_from_scratch && config.checkpoint_tx_id.is_none())
        .then_some(BootstrapPlan::LiveState)
}

fn auto_checkpoint(config: &ReplicaConfig) -> Option<BootstrapPlan> {
    (config.load_from_checkpoint && !config.load_from_scratch && config.checkpoint_tx_id.is_none())
        .then_some(BootstrapPlan::AutoCheckpoint {
            max_nonce: config.forward_limit,
        })
}

fn empty(_: &ReplicaConfig) -> Option<BootstrapPlan> {
    Some(BootstrapPlan::Empty)
}

/// The plan that wins for this configuration.
pub fn select_plan(config: &ReplicaConfig) -> BootstrapPlan {
    EVALUATORS
        .iter()
        .find_map(|evaluate| evaluate(config))
        .unwrap_or(BootstrapPlan::Empty)
}

/// The winning plan followed by its fallbacks, in the order they are tried.
pub fn plan_chain(config: &ReplicaConfig) -> Vec<BootstrapPlan> {
    let mut chain: Vec<BootstrapPlan> = EVALUATORS.iter().filter_map(|e| e(config)).collect();
    if chain.first().is_some_and(BootstrapPlan::is_exclusive) {
        chain.truncate(1);
    }
    chain
}

/// State a successful strategy produced.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub plan: BootstrapPlan,
    pub state: StateBlob,
    pub nonce: Option<u64>,
    pub timestamp: Option<u64>,
    pub checkpoint: Option<Checkpoint>,
}

impl BootstrapOutcome {
    fn blank(plan: BootstrapPlan) -> Self {
        Self {
            plan,
            state: StateBlob::empty(),
            nonce: None,
            timestamp: None,
            checkpoint: None,
        }
    }

    pub fn source(&self) -> BootstrapSource {
        self.plan.source()
    }
}

/// Executes plans against the loaders.
pub struct Bootstrapper<'a> {
    pub fetcher: &'a MessageFetcher,
    pub locator: &'a CheckpointLocator,
    pub loader: &'a CheckpointLoader,
    pub live: &'a LiveStateLoader,
}

impl Bootstrapper<'_> {
    /// Walk the chain until a strategy yields state.
    ///
    /// Only an explicit checkpoint failure is returned as an error; every
    /// other failure is logged and the next strategy is tried.
    pub async fn run(&self, config: &ReplicaConfig) -> Result<BootstrapOutcome> {
        let process_id = config.process_id.as_str();
        for plan in plan_chain(config) {
            let strategy = plan.strategy();
            info!(process_id, strategy, "trying bootstrap strategy");
            match self.execute(process_id, &plan, config.forward_limit).await {
                Ok(Some(outcome)) => {
                    info!(
                        process_id,
                        strategy,
                        nonce = ?outcome.nonce,
                        size = outcome.state.len(),
                        "bootstrap strategy succeeded"
                    );
                    return Ok(outcome);
                }
                Ok(None) => info!(process_id, strategy, "bootstrap strategy produced no state"),
                Err(e) if matches!(plan, BootstrapPlan::ExplicitCheckpoint { .. }) => {
                    error!(process_id, strategy, error = %e, "explicit checkpoint failed, halting");
                    return Err(ReplicaError::Bootstrap {
                        strategy,
                        reason: e.to_string(),
                    });
                }
                Err(e) => warn!(process_id, strategy, error = %e, "bootstrap strategy failed"),
            }
        }
        // Every chain ends in a strategy that cannot fail.
        Ok(BootstrapOutcome::blank(BootstrapPlan::Empty))
    }

    /// `Ok(None)` means the strategy applied but found nothing usable.
    pub async fn execute(
        &self,
        process_id: &str,
        plan: &BootstrapPlan,
        forward_limit: Option<u64>,
    ) -> Result<Option<BootstrapOutcome>> {
        match plan {
            BootstrapPlan::Scratch => Ok(Some(BootstrapOutcome::blank(plan.clone()))),
            BootstrapPlan::ExplicitCheckpoint { tx_id } => {
                let prepared = self.loader.prepare(process_id, tx_id).await?;
                if prepared.nonce.is_none() {
                    warn!(process_id, tx_id, "explicit checkpoint has no nonce, replaying from 0");
                }
                Ok(Some(BootstrapOutcome {
                    plan: plan.clone(),
                    nonce: prepared.nonce,
                    checkpoint: Some(Checkpoint {
                        tx_id: prepared.tx_id,
                        nonce: prepared.nonce,
                    }),
                    state: prepared.blob,
                    timestamp: None,
                }))
            }
            BootstrapPlan::LiveState => self.live_state(process_id, forward_limit).await,
            BootstrapPlan::AutoCheckpoint { max_nonce } => {
                let found = match max_nonce {
                    Some(max) => self.locator.locate_at_or_before(process_id, *max).await?,
                    None => self.locator.locate_latest(process_id).await?,
                };
                let Some(checkpoint) = found else {
                    return Ok(None);
                };
                let prepared = self.loader.prepare(process_id, &checkpoint.tx_id).await?;
                let nonce = prepared.nonce.or(checkpoint.nonce);
                Ok(Some(BootstrapOutcome {
                    plan: plan.clone(),
                    nonce,
                    checkpoint: Some(Checkpoint {
                        tx_id: prepared.tx_id,
                        nonce,
                    }),
                    state: prepared.blob,
                    timestamp: None,
                }))
            }
            BootstrapPlan::Empty => {
                error!(
                    process_id,
                    "no bootstrap source produced state; starting from empty state without catch-up"
                );
                Ok(Some(BootstrapOutcome::blank(plan.clone())))
            }
        }
    }

    async fn live_state(
        &self,
        process_id: &str,
        forward_limit: Option<u64>,
    ) -> Result<Option<BootstrapOutcome>> {
        let live = self.live.load(process_id).await?;
        let nonce = match live.nonce {
            Some(nonce) => nonce,
            None => match self.fetcher.latest_nonce(process_id).await {
                Ok(Some(latest)) => {
                    info!(process_id, latest, "live state nonce taken from sequencer head");
                    latest
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!(process_id, error = %e, "sequencer head lookup failed");
                    return Ok(None);
                }
            },
        };
        if forward_limit.is_some_and(|limit| nonce > limit) {
            info!(
                process_id,
                nonce,
                forward_limit = ?forward_limit,
                "live state is past the forward limit"
            );
            return Ok(None);
        }
        Ok(Some(BootstrapOutcome {
            plan: BootstrapPlan::LiveState,
            state: live.blob,
            nonce: Some(nonce),
            timestamp: live.timestamp,
            checkpoint: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        checkpoint_tx, MockBlobSource, MockLiveState, MockRegistry, MockSequencer, TEST_PROCESS,
    };
    use replica_cache::ReplicaCache;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_overrides_checkpoint_options() {
        let config = ReplicaConfig::new("p")
            .with_scratch()
            .with_checkpoint_tx("tx")
            .with_auto_checkpoint();
        assert_eq!(select_plan(&config), BootstrapPlan::Scratch);
        assert_eq!(plan_chain(&config), vec![BootstrapPlan::Scratch]);
    }

    #[test]
    fn test_explicit_checkpoint_has_no_fallback() {
        let config = ReplicaConfig::new("p").with_checkpoint_tx("tx").with_auto_checkpoint();
        assert_eq!(
            plan_chain(&config),
            vec![BootstrapPlan::ExplicitCheckpoint { tx_id: "tx".into() }]
        );
    }

    #[test]
    fn test_default_chain() {
        let config = ReplicaConfig::new("p");
        assert_eq!(
            plan_chain(&config),
            vec![BootstrapPlan::LiveState, BootstrapPlan::Empty]
        );

        let config = config.with_auto_checkpoint().with_forward_limit(42);
        assert_eq!(
            plan_chain(&config),
            vec![
                BootstrapPlan::LiveState,
                BootstrapPlan::AutoCheckpoint {
                    max_nonce: Some(42)
                },
                BootstrapPlan::Empty,
            ]
        );
    }

    struct Fixture {
        _dir: TempDir,
        sequencer: Arc<MockSequencer>,
        live_source: Arc<MockLiveState>,
        blobs: Arc<MockBlobSource>,
        fetcher: MessageFetcher,
        locator: CheckpointLocator,
        loader: CheckpointLoader,
        live: LiveStateLoader,
    }

    impl Fixture {
        fn new(checkpoints: &[&[u64]]) -> Self {
            let dir = TempDir::new().unwrap();
            let cache = ReplicaCache::open(dir.path()).unwrap();
            let sequencer = Arc::new(MockSequencer::with_nonces(TEST_PROCESS, 0..5));
            let registry = Arc::new(MockRegistry::from_pages(checkpoints));
            let blobs = Arc::new(MockBlobSource::default());
            let live_source = Arc::new(MockLiveState::new());
            Self {
                fetcher: MessageFetcher::new(sequencer.clone(), 500),
                locator: CheckpointLocator::new(registry.clone(), 20),
                loader: CheckpointLoader::new(
                    blobs.clone(),
                    registry,
                    cache.checkpoints().clone(),
                ),
                live: LiveStateLoader::new(live_source.clone(), cache.live().clone()),
                _dir: dir,
                sequencer,
                live_source,
                blobs,
            }
        }

        fn bootstrapper(&self) -> Bootstrapper<'_> {
            Bootstrapper {
                fetcher: &self.fetcher,
                locator: &self.locator,
                loader: &self.loader,
                live: &self.live,
            }
        }
    }

    #[tokio::test]
    async fn test_live_state_falls_back_to_sequencer_head() {
        let fx = Fixture::new(&[]);
        fx.live_source.serve(b"live", None);
        fx.sequencer.set_latest(Some(4));

        let outcome = fx.bootstrapper().run(&ReplicaConfig::new(TEST_PROCESS)).await.unwrap();
        assert_eq!(outcome.plan, BootstrapPlan::LiveState);
        assert_eq!(outcome.nonce, Some(4));
        assert_eq!(outcome.state.as_bytes(), b"live");
    }

    #[tokio::test]
    async fn test_indeterminate_live_state_falls_through_to_empty() {
        let fx = Fixture::new(&[]);
        fx.live_source.serve(b"live", Some("-1"));
        fx.sequencer.set_latest(None);

        let outcome = fx.bootstrapper().run(&ReplicaConfig::new(TEST_PROCESS)).await.unwrap();
        assert_eq!(outcome.plan, BootstrapPlan::Empty);
        assert_eq!(outcome.nonce, None);
    }

    #[tokio::test]
    async fn test_live_state_past_limit_uses_bounded_checkpoint() {
        let fx = Fixture::new(&[&[50], &[40], &[30]]);
        fx.live_source.serve(b"live", Some("60"));
        fx.blobs.insert(&checkpoint_tx(40), b"at-40");

        let config = ReplicaConfig::new(TEST_PROCESS)
            .with_auto_checkpoint()
            .with_forward_limit(42);
        let outcome = fx.bootstrapper().run(&config).await.unwrap();
        assert_eq!(
            outcome.plan,
            BootstrapPlan::AutoCheckpoint {
                max_nonce: Some(42)
            }
        );
        assert_eq!(outcome.nonce, Some(40));
        assert_eq!(outcome.state.as_bytes(), b"at-40");
    }

    #[tokio::test]
    async fn test_failed_auto_checkpoint_is_not_fatal() {
        let fx = Fixture::new(&[&[50]]);
        fx.live_source.fail();
        // Checkpoint 50 is listed but its blob is missing.
        let config = ReplicaConfig::new(TEST_PROCESS).with_auto_checkpoint();
        let outcome = fx.bootstrapper().run(&config).await.unwrap();
        assert_eq!(outcome.plan, BootstrapPlan::Empty);
    }

    #[tokio::test]
    async fn test_explicit_checkpoint_failure_halts() {
        let fx = Fixture::new(&[]);
        fx.live_source.serve(b"live", Some("3"));
        let config = ReplicaConfig::new(TEST_PROCESS).with_checkpoint_tx("missing");
        let err = fx.bootstrapper().run(&config).await.unwrap_err();
        assert!(matches!(
            err,
            ReplicaError::Bootstrap {
                strategy: "explicit-checkpoint",
                ..
            }
        ));
        assert_eq!(fx.live_source.calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_checkpoint_without_nonce_starts_before_zero() {
        let fx = Fixture::new(&[]);
        fx.blobs.insert("pinned", b"pinned-state");
        let config = ReplicaConfig::new(TEST_PROCESS).with_checkpoint_tx("pinned");
        let outcome = fx.bootstrapper().run(&config).await.unwrap();
        assert_eq!(outcome.nonce, None);
        assert_eq!(outcome.state.as_bytes(), b"pinned-state");
        assert_eq!(outcome.checkpoint.map(|c| c.tx_id).as_deref(), Some("pinned"));
    }
}
