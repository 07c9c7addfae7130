//! aos-replica: keep a local replica of an AO process in step with its sequencer.
//!
//! ## Commands
//!
//! - **serve**: bootstrap, catch up, then poll until Ctrl-C
//! - **dry-run**: evaluate one message against an isolated snapshot
//! - **checkpoint**: find the checkpoint a bootstrap would use
//! - **health**: bootstrap once and print the health report
//!
//! ## Example Usage
//!
//! ```bash
//! # Follow a process from its latest checkpoint
//! aos-replica serve --process-id <PID> --load-from-checkpoint
//!
//! # Replay up to nonce 1200 from scratch, then dry-run a message
//! aos-replica dry-run --process-id <PID> --load-from-scratch --forward-to-nonce 1200 --message msg.json
//!
//! # Newest checkpoint at or before nonce 5000
//! aos-replica checkpoint --process-id <PID> --max-nonce 5000
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod replica_cli;

use replica_cli::{
    checkpoint::CheckpointCmd, dry_run::DryRunCmd, health::HealthCmd, serve::ServeCmd,
};

#[derive(Parser)]
#[command(
    name = "aos-replica",
    author,
    version,
    about = "Continuously synchronized local replica of an AO process",
    long_about = "Bootstraps a process replica from scratch, a checkpoint or the live state \
                  service, then replays the sequencer log in nonce order.\n\n\
                  Every option can also be set through its environment variable."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap, catch up and keep polling until interrupted
    Serve(ServeCmd),

    /// Run one speculative message against a snapshot of the replica
    DryRun(DryRunCmd),

    /// Locate the checkpoint a bootstrap would start from
    Checkpoint(CheckpointCmd),

    /// Bootstrap once and print the health report
    Health(HealthCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { command, log_json } = Cli::parse();
    aos_replica::logging::init(log_json);

    match command {
        Commands::Serve(cmd) => cmd.execute().await,
        Commands::DryRun(cmd) => cmd.execute().await,
        Commands::Checkpoint(cmd) => cmd.execute().await,
        Commands::Health(cmd) => cmd.execute().await,
    }
}
