//! End-to-end replay behavior against in-memory collaborators.
//!
//! Run with: cargo test --test replay_properties

use replica_core::testing::{
    raw_entry, MockBlobSource, MockDirectory, MockLiveState, MockRegistry, MockSequencer,
    RecordingEngine, TEST_PROCESS,
};
use replica_core::{
    DryRunRequest, ExecutionEngine, JsonFoldEngine, Phase, ReplayCoordinator, ReplicaConfig,
    ReplicaError, ReplicaSources, SnapshotManager, StopReason, TickOutcome,
};
use replica_types::BootstrapSource;
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// Fixture
// =============================================================================

struct Fixture {
    _dir: TempDir,
    sequencer: Arc<MockSequencer>,
    blobs: Arc<MockBlobSource>,
    live: Arc<MockLiveState>,
    engine: Arc<RecordingEngine>,
    coordinator: Arc<ReplayCoordinator>,
}

fn fixture(
    nonces: std::ops::Range<u64>,
    registry: MockRegistry,
    configure: impl FnOnce(ReplicaConfig) -> ReplicaConfig,
) -> Fixture {
    let dir = TempDir::new().unwrap();
    let sequencer = Arc::new(MockSequencer::with_nonces(TEST_PROCESS, nonces));
    let blobs = Arc::new(MockBlobSource::default());
    let live = Arc::new(MockLiveState::new());
    let engine = Arc::new(RecordingEngine::new());
    let sources = ReplicaSources {
        sequencer: sequencer.clone(),
        registry: Arc::new(registry),
        blobs: blobs.clone(),
        live: live.clone(),
        directory: Arc::new(MockDirectory::default()),
    };
    let config = configure(ReplicaConfig::new(TEST_PROCESS).with_cache_root(dir.path()));
    let coordinator =
        Arc::new(ReplayCoordinator::new(config, sources, engine.clone()).unwrap());
    Fixture {
        _dir: dir,
        sequencer,
        blobs,
        live,
        engine,
        coordinator,
    }
}

async fn applied_state(coordinator: &ReplayCoordinator) -> Vec<u64> {
    RecordingEngine::decode(coordinator.replica().await.state())
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn scratch_replays_the_whole_log_in_order() {
    let f = fixture(0..3, MockRegistry::default(), |c| c.with_scratch());
    let report = f.coordinator.bootstrap().await.unwrap();

    assert_eq!(report.source, BootstrapSource::Scratch);
    assert_eq!(f.engine.calls(), vec![0, 1, 2]);
    assert_eq!(applied_state(&f.coordinator).await, vec![0, 1, 2]);
    assert_eq!(f.coordinator.last_processed_nonce().await, Some(2));
    assert_eq!(f.coordinator.phase(), Phase::Idle);
}

#[tokio::test]
async fn scratch_overrides_checkpoint_options() {
    let f = fixture(0..2, MockRegistry::from_pages(&[&[1]]), |c| {
        c.with_scratch()
            .with_checkpoint_tx("ckpt-1")
            .with_auto_checkpoint()
    });
    let report = f.coordinator.bootstrap().await.unwrap();

    assert_eq!(report.source, BootstrapSource::Scratch);
    assert_eq!(f.blobs.fetch_count(), 0);
    assert_eq!(f.live.calls(), 0);
    assert_eq!(f.engine.calls(), vec![0, 1]);
}

#[tokio::test]
async fn auto_checkpoint_resumes_after_its_nonce() {
    let f = fixture(0..8, MockRegistry::from_pages(&[&[5, 2]]), |c| {
        c.with_auto_checkpoint()
    });
    f.blobs.insert("ckpt-5", b"0,1,2,3,4,5");
    f.live.fail();

    let report = f.coordinator.bootstrap().await.unwrap();
    assert_eq!(report.source, BootstrapSource::AutoCheckpoint);
    assert_eq!(report.checkpoint.map(|c| c.tx_id).as_deref(), Some("ckpt-5"));
    assert_eq!(f.engine.calls(), vec![6, 7]);
    assert_eq!(applied_state(&f.coordinator).await, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn live_state_is_preferred_over_checkpoints() {
    let f = fixture(0..6, MockRegistry::from_pages(&[&[2]]), |c| {
        c.with_auto_checkpoint()
    });
    f.live.serve(b"0,1,2,3", Some("3"));

    let report = f.coordinator.bootstrap().await.unwrap();
    assert_eq!(report.source, BootstrapSource::LiveState);
    assert_eq!(f.blobs.fetch_count(), 0);
    assert_eq!(f.engine.calls(), vec![4, 5]);
}

#[tokio::test]
async fn unloadable_explicit_checkpoint_halts_the_replica() {
    let f = fixture(0..3, MockRegistry::default(), |c| {
        c.with_checkpoint_tx("missing")
    });
    f.live.serve(b"0,1,2", Some("2"));

    let err = f.coordinator.bootstrap().await.unwrap_err();
    assert!(matches!(err, ReplicaError::Bootstrap { .. }));
    assert_eq!(f.coordinator.phase(), Phase::Halted);
    assert_eq!(f.live.calls(), 0);
    assert!(f.engine.calls().is_empty());
    assert!(matches!(f.coordinator.poll_once().await, TickOutcome::Skipped(_)));
}

#[tokio::test]
async fn checkpoint_blob_is_downloaded_once() {
    let dir = TempDir::new().unwrap();
    let blobs = Arc::new(MockBlobSource::default());
    blobs.insert("ckpt-1", b"0,1");

    for _ in 0..2 {
        let sources = ReplicaSources {
            sequencer: Arc::new(MockSequencer::with_nonces(TEST_PROCESS, 0..3)),
            registry: Arc::new(MockRegistry::from_pages(&[&[1]])),
            blobs: blobs.clone(),
            live: Arc::new(MockLiveState::new()),
            directory: Arc::new(MockDirectory::default()),
        };
        let config = ReplicaConfig::new(TEST_PROCESS)
            .with_checkpoint_tx("ckpt-1")
            .with_cache_root(dir.path());
        let coordinator =
            ReplayCoordinator::new(config, sources, Arc::new(RecordingEngine::new())).unwrap();
        coordinator.bootstrap().await.unwrap();
        assert_eq!(applied_state(&coordinator).await, vec![0, 1, 2]);
    }
    assert_eq!(blobs.fetch_count(), 1);
}

// =============================================================================
// Replay
// =============================================================================

#[tokio::test]
async fn failed_apply_is_retried_from_the_same_nonce() {
    let f = fixture(0..5, MockRegistry::default(), |c| c.with_scratch());
    f.engine.fail_at(Some(2));

    let report = f.coordinator.bootstrap().await.unwrap();
    assert!(matches!(
        report.catch_up.map(|c| c.stop),
        Some(StopReason::Failed(ReplicaError::Apply { nonce: 2, .. }))
    ));
    assert_eq!(f.coordinator.last_processed_nonce().await, Some(1));

    f.engine.fail_at(None);
    let TickOutcome::Completed(pass) = f.coordinator.poll_once().await else {
        panic!("poll should run after a failed batch");
    };
    assert_eq!(pass.applied, 3);
    assert_eq!(f.engine.calls(), vec![0, 1, 2, 2, 3, 4]);
    assert_eq!(applied_state(&f.coordinator).await, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn forward_limit_is_never_crossed() {
    let f = fixture(0..10, MockRegistry::default(), |c| {
        c.with_scratch().with_forward_limit(4)
    });
    f.coordinator.bootstrap().await.unwrap();
    assert_eq!(f.coordinator.last_processed_nonce().await, Some(4));

    f.sequencer.push(raw_entry(TEST_PROCESS, 10));
    for _ in 0..3 {
        assert!(matches!(
            f.coordinator.poll_once().await,
            TickOutcome::Skipped(_)
        ));
    }
    assert_eq!(f.engine.calls(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn paged_replay_matches_single_batch_replay() {
    let batched = fixture(0..12, MockRegistry::default(), |c| c.with_scratch());
    let paged = fixture(0..12, MockRegistry::default(), |c| {
        c.with_scratch().with_message_page_size(1)
    });
    batched.coordinator.bootstrap().await.unwrap();
    let report = paged.coordinator.bootstrap().await.unwrap();

    assert!(report.catch_up.is_some_and(|c| c.passes >= 12));
    assert_eq!(
        batched.coordinator.replica().await.state(),
        paged.coordinator.replica().await.state()
    );
    assert_eq!(
        batched.coordinator.last_processed_nonce().await,
        paged.coordinator.last_processed_nonce().await
    );
}

#[tokio::test]
async fn last_processed_nonce_only_moves_forward() {
    let f = fixture(0..2, MockRegistry::default(), |c| c.with_scratch());
    f.coordinator.bootstrap().await.unwrap();

    let mut seen = f.coordinator.last_processed_nonce().await;
    for nonce in [2, 1, 3, 3, 0, 4] {
        f.sequencer.push(raw_entry(TEST_PROCESS, nonce));
        f.coordinator.poll_once().await;
        let current = f.coordinator.last_processed_nonce().await;
        assert!(current >= seen, "{current:?} regressed from {seen:?}");
        seen = current;
    }
    assert_eq!(seen, Some(4));
    assert_eq!(applied_state(&f.coordinator).await, vec![0, 1, 2, 3, 4]);
}

// =============================================================================
// Speculative execution
// =============================================================================

fn dry_run_body() -> DryRunRequest {
    serde_json::from_value(serde_json::json!({
        "Target": TEST_PROCESS,
        "Tags": { "Action": "Balance" },
        "Data": { "recipient": "abc" },
    }))
    .unwrap()
}

#[tokio::test]
async fn speculation_leaves_authoritative_state_untouched() {
    let f = fixture(0..3, MockRegistry::default(), |c| c.with_scratch());
    f.coordinator.bootstrap().await.unwrap();
    let manager = SnapshotManager::new(f.coordinator.clone());
    manager.refresh_snapshot().await.unwrap();

    let first = manager.speculate(dry_run_body()).await.unwrap();
    let second = manager.speculate(dry_run_body()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.snapshot_nonce, 2);
    assert_eq!(f.coordinator.last_processed_nonce().await, Some(2));
    assert_eq!(applied_state(&f.coordinator).await, vec![0, 1, 2]);

    f.sequencer.push(raw_entry(TEST_PROCESS, 3));
    f.coordinator.poll_once().await;
    assert_eq!(applied_state(&f.coordinator).await, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn json_engine_dry_run_reports_effects_without_state() {
    let dir = TempDir::new().unwrap();
    let sources = ReplicaSources {
        sequencer: Arc::new(MockSequencer::with_nonces(TEST_PROCESS, 0..2)),
        registry: Arc::new(MockRegistry::default()),
        blobs: Arc::new(MockBlobSource::default()),
        live: Arc::new(MockLiveState::new()),
        directory: Arc::new(MockDirectory::default()),
    };
    let engine: Arc<dyn ExecutionEngine> = Arc::new(JsonFoldEngine::new());
    let config = ReplicaConfig::new(TEST_PROCESS)
        .with_scratch()
        .with_cache_root(dir.path());
    let coordinator = Arc::new(ReplayCoordinator::new(config, sources, engine).unwrap());
    coordinator.bootstrap().await.unwrap();

    let manager = SnapshotManager::new(coordinator.clone());
    manager.refresh_snapshot().await.unwrap();
    let outcome = manager.speculate(dry_run_body()).await.unwrap();
    assert_eq!(outcome.output["nonce"], 2);
    assert_eq!(outcome.output["messageId"], "MESSAGE_ID");

    let encoded = serde_json::to_value(&outcome).unwrap();
    assert!(encoded.get("State").is_none());
    assert_eq!(encoded["SnapshotNonce"], 1);

    let state: serde_json::Value =
        serde_json::from_slice(coordinator.replica().await.state().as_bytes()).unwrap();
    assert_eq!(state["lastNonce"], 1);
}
