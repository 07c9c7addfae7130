//! Subcommand implementations for aos-replica

pub mod checkpoint;
pub mod dry_run;
pub mod health;
pub mod serve;

use anyhow::Result;
use aos_replica::args::ReplicaArgs;
use aos_replica::replica_core::{ReplayCoordinator, ReplicaConfig};
use std::sync::Arc;

/// Exit status for unusable configuration.
pub const EXIT_CONFIGURATION: i32 = 2;

/// Validated configuration, or exit with [`EXIT_CONFIGURATION`].
pub fn config_or_exit(args: ReplicaArgs) -> ReplicaConfig {
    let config = args.into_config();
    if let Err(err) = config.validate() {
        eprintln!("{err}");
        std::process::exit(EXIT_CONFIGURATION);
    }
    config
}

pub fn coordinator(args: ReplicaArgs) -> Result<Arc<ReplayCoordinator>> {
    aos_replica::runtime::build_coordinator(config_or_exit(args))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
