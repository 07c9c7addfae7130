//! `checkpoint`: locate the checkpoint a bootstrap would start from.

use anyhow::Result;
use aos_replica::args::ReplicaArgs;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct CheckpointCmd {
    #[command(flatten)]
    replica: ReplicaArgs,

    /// Newest checkpoint at or before this nonce (latest when omitted)
    #[arg(long, value_name = "NONCE")]
    max_nonce: Option<u64>,
}

impl CheckpointCmd {
    pub async fn execute(self) -> Result<()> {
        let coordinator = super::coordinator(self.replica)?;
        let locator = coordinator.locator();
        let process_id = coordinator.process_id();
        let checkpoint = match self.max_nonce {
            Some(max) => locator.locate_at_or_before(process_id, max).await?,
            None => locator.locate_latest(process_id).await?,
        };
        super::print_json(&checkpoint)
    }
}
