//! `health`: bootstrap once and report.

use anyhow::Result;
use aos_replica::args::ReplicaArgs;
use clap::Parser;
use tracing::error;

#[derive(Parser, Debug)]
pub struct HealthCmd {
    #[command(flatten)]
    replica: ReplicaArgs,

    /// Also print the metrics in the Prometheus text format
    #[arg(long)]
    metrics: bool,
}

impl HealthCmd {
    pub async fn execute(self) -> Result<()> {
        let coordinator = super::coordinator(self.replica)?;
        // A failed bootstrap is part of the report.
        if let Err(e) = coordinator.bootstrap().await {
            error!(error = %e, "bootstrap failed");
        }
        let report = coordinator.health().await;
        super::print_json(&report)?;
        if self.metrics {
            print!("{}", coordinator.metrics().render());
        }
        Ok(())
    }
}
