//! Subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,aos_replica=info,replica_core=info";

/// Install the global subscriber. `RUST_LOG` overrides [`DEFAULT_FILTER`].
///
/// Returns `false` when a subscriber was already installed.
pub fn init(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.with_target(false).try_init().is_ok()
    }
}
