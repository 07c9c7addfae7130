//! Periodic poll and full-refresh timers.

use crate::coordinator::{RefreshOutcome, ReplayCoordinator, TickOutcome};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// `base` plus a uniformly random delay in `[0, max_jitter]`.
pub fn jittered(base: Duration, max_jitter: Duration) -> Duration {
    let jitter_ms = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
}

/// Running timer tasks. Dropping the handle stops them after the current
/// tick; [`SchedulerHandle::shutdown`] also waits for them to finish.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("scheduler stopped");
    }
}

/// Start the poll timer and, when enabled, the full-refresh timer.
///
/// A tick that collides with a running activity is dropped; the next tick
/// tries again.
pub fn spawn_scheduler(coordinator: Arc<ReplayCoordinator>) -> SchedulerHandle {
    let (stop, _) = watch::channel(false);
    let mut tasks = Vec::with_capacity(2);

    let config = coordinator.config().clone();
    info!(
        process_id = %config.process_id,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        poll_jitter_ms = config.poll_jitter.as_millis() as u64,
        full_refresh_ms = ?config.full_refresh_interval.map(|d| d.as_millis()),
        "scheduler starting"
    );

    let poller = coordinator.clone();
    let mut stop_rx = stop.subscribe();
    tasks.push(tokio::spawn(async move {
        loop {
            let delay = jittered(config.poll_interval, config.poll_jitter);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if let TickOutcome::Completed(report) = poller.poll_once().await {
                        debug!(applied = report.applied, fetched = report.fetched, "poll tick");
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }));

    let refresh_interval = coordinator
        .config()
        .full_refresh_interval
        .filter(|_| coordinator.config().full_refresh_enabled());
    if let Some(interval) = refresh_interval {
        let refresher = coordinator.clone();
        let mut stop_rx = stop.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let RefreshOutcome::Ignored { reported, current } = refresher.full_refresh().await {
                            debug!(?reported, ?current, "full refresh tick ignored");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    SchedulerHandle { stop, tasks }
}
