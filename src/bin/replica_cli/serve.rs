//! `serve`: bootstrap, then follow the log until interrupted.

use anyhow::{Context, Result};
use aos_replica::args::ReplicaArgs;
use aos_replica::replica_core::spawn_scheduler;
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
pub struct ServeCmd {
    #[command(flatten)]
    replica: ReplicaArgs,

    /// Stop after bootstrap and catch-up instead of polling
    #[arg(long)]
    once: bool,
}

impl ServeCmd {
    pub async fn execute(self) -> Result<()> {
        let coordinator = super::coordinator(self.replica)?;
        let report = coordinator
            .bootstrap()
            .await
            .context("replica bootstrap failed")?;
        info!(
            source = ?report.source,
            nonce = ?report.nonce,
            catch_up = ?report.catch_up.as_ref().map(|c| &c.stop),
            "replica ready"
        );

        if self.once {
            super::print_json(&coordinator.health().await)?;
            return Ok(());
        }

        let scheduler = spawn_scheduler(coordinator.clone());
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c, shutting down");
        }
        info!("shutdown requested");
        scheduler.shutdown().await;

        info!(
            last_processed_nonce = ?coordinator.last_processed_nonce().await,
            metrics = %coordinator.metrics().render(),
            "replica stopped"
        );
        Ok(())
    }
}
