//! `dry-run`: evaluate one message against an isolated snapshot.

use anyhow::{Context, Result};
use aos_replica::args::ReplicaArgs;
use aos_replica::replica_core::{DryRunRequest, SnapshotManager};
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
pub struct DryRunCmd {
    #[command(flatten)]
    replica: ReplicaArgs,

    /// JSON message body (`Target`, `Tags`, optional `Owner`, `From`, `Data`, ...); `-` reads stdin
    #[arg(long, value_name = "FILE")]
    message: PathBuf,

    /// Commit the message to the replica instead of running it speculatively
    #[arg(long)]
    write: bool,
}

impl DryRunCmd {
    pub async fn execute(self) -> Result<()> {
        let request = read_request(&self.message)?;
        let coordinator = super::coordinator(self.replica)?;
        coordinator
            .bootstrap()
            .await
            .context("replica bootstrap failed")?;

        let manager = SnapshotManager::new(coordinator);
        if self.write {
            let result = manager.execute_authoritative(request).await?;
            let committed = manager
                .coordinator()
                .last_processed_nonce()
                .await
                .map_or(-1, |n| n as i64);
            info!(committed, "message committed");
            return super::print_json(&result.into_speculative(committed, false));
        }

        let snapshot_nonce = manager.refresh_snapshot().await?;
        info!(snapshot_nonce, "running dry-run");
        let outcome = manager.speculate(request).await?;
        super::print_json(&outcome)
    }
}

fn read_request(path: &Path) -> Result<DryRunRequest> {
    let mut body = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read message from stdin")?;
    } else {
        body = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    serde_json::from_str(&body).context("message is not a valid dry-run request")
}
