use clap::Args;
use replica_core::config::{
    DEFAULT_CHECKPOINT_PAGE_SIZE, DEFAULT_MESSAGE_PAGE_SIZE, DEFAULT_POLL_JITTER,
};
use replica_core::ReplicaConfig;
use replica_transport::network::{
    DEFAULT_GATEWAY_URL, DEFAULT_GRAPHQL_URL, DEFAULT_SEQUENCER_URL, DEFAULT_STATE_URL,
};
use replica_transport::Endpoints;
use std::path::PathBuf;
use std::time::Duration;

/// Replica options shared by every subcommand.
///
/// Each option can also be set through the environment variable named next
/// to it; an explicit flag wins.
#[derive(Debug, Clone, Args)]
pub struct ReplicaArgs {
    /// Process whose log is replicated.
    #[arg(long, env = "PROCESS_ID_TO_MONITOR", value_name = "ID")]
    pub process_id: Option<String>,

    /// Module the process runs. Looked up from process metadata when unset.
    #[arg(long, env = "AOS_MODULE_ID", value_name = "ID")]
    pub module_id: Option<String>,

    /// Sequencer base URL.
    #[arg(long, env = "SU_URL", default_value = DEFAULT_SEQUENCER_URL)]
    pub su_url: String,

    /// GraphQL index used for checkpoint discovery and process metadata.
    #[arg(long, env = "AOS_GRAPHQL_URL", default_value = DEFAULT_GRAPHQL_URL)]
    pub graphql_url: String,

    /// Gateway serving checkpoint blobs.
    #[arg(long, env = "AOS_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,

    /// Service reporting the live process state.
    #[arg(long, env = "AOS_STATE_URL", default_value = DEFAULT_STATE_URL)]
    pub state_url: String,

    /// Base delay between message polls. 0 falls back to the default.
    #[arg(long, env = "MESSAGE_POLL_INTERVAL_MS", default_value_t = 5_000)]
    pub message_poll_interval_ms: u64,

    /// Upper bound of the random delay added to every poll.
    #[arg(long, env = "MESSAGE_POLL_JITTER_MS", default_value_t = DEFAULT_POLL_JITTER.as_millis() as u64)]
    pub message_poll_jitter_ms: u64,

    /// Interval of the periodic full state refresh. Unset or 0 disables it.
    #[arg(long, env = "FULL_STATE_REFRESH_INTERVAL_MS")]
    pub full_state_refresh_interval_ms: Option<u64>,

    /// Never apply a message with a nonce above this value.
    #[arg(long, env = "FORWARD_TO_NONCE", value_name = "NONCE")]
    pub forward_to_nonce: Option<u64>,

    /// Start from this checkpoint transaction. Failing to load it halts the replica.
    #[arg(long, env = "CHECKPOINT_TX_ID", value_name = "TX")]
    pub checkpoint_tx_id: Option<String>,

    /// Discover the latest usable checkpoint when live state is unavailable.
    #[arg(long, env = "LOAD_FROM_CHECKPOINT", default_value_t = false)]
    pub load_from_checkpoint: bool,

    /// Start from empty state and replay the whole log.
    #[arg(long, env = "LOAD_FROM_SCRATCH", default_value_t = false)]
    pub load_from_scratch: bool,

    /// Log entries requested per sequencer page.
    #[arg(long, env = "AOS_MESSAGE_PAGE_SIZE", default_value_t = DEFAULT_MESSAGE_PAGE_SIZE)]
    pub message_page_size: usize,

    /// Checkpoint records requested per registry page.
    #[arg(long, env = "AOS_CHECKPOINT_PAGE_SIZE", default_value_t = DEFAULT_CHECKPOINT_PAGE_SIZE)]
    pub checkpoint_page_size: usize,

    /// Per-request timeout in seconds. Defaults to 30.
    #[arg(long, env = "AOS_REPLICA_HTTP_TIMEOUT_SECS", value_name = "SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Connect timeout in seconds. Defaults to 10.
    #[arg(long, env = "AOS_REPLICA_CONNECT_TIMEOUT_SECS", value_name = "SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// Cache directory (defaults to the platform data dir).
    #[arg(long, env = "AOS_REPLICA_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl ReplicaArgs {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            sequencer: self.su_url.clone(),
            graphql: self.graphql_url.clone(),
            gateway: self.gateway_url.clone(),
            state: self.state_url.clone(),
        }
    }

    /// Build the replica configuration. A missing process id is left blank
    /// so that [`ReplicaConfig::validate`] reports it.
    pub fn into_config(self) -> ReplicaConfig {
        let endpoints = self.endpoints();
        let mut config = ReplicaConfig::new(self.process_id.unwrap_or_default());
        config.module_id = self.module_id.filter(|id| !id.trim().is_empty());
        config.endpoints = endpoints;
        config.poll_interval = Duration::from_millis(self.message_poll_interval_ms);
        config.poll_jitter = Duration::from_millis(self.message_poll_jitter_ms);
        config.full_refresh_interval = self
            .full_state_refresh_interval_ms
            .map(Duration::from_millis);
        config.forward_limit = self.forward_to_nonce;
        config.checkpoint_tx_id = self.checkpoint_tx_id;
        config.load_from_checkpoint = self.load_from_checkpoint;
        config.load_from_scratch = self.load_from_scratch;
        config.message_page_size = self.message_page_size;
        config.checkpoint_page_size = self.checkpoint_page_size;
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = self.cache_dir {
            config.cache_root = dir;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use replica_transport::http::default_timeouts;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        replica: ReplicaArgs,
    }

    #[test]
    fn test_flags_map_onto_config() {
        let cli = TestCli::try_parse_from([
            "test",
            "--process-id",
            "pid",
            "--forward-to-nonce",
            "42",
            "--checkpoint-tx-id",
            "tx-1",
            "--full-state-refresh-interval-ms",
            "60000",
            "--su-url",
            "http://localhost:9000",
        ])
        .unwrap();
        let config = cli.replica.into_config();
        assert_eq!(config.process_id, "pid");
        assert_eq!(config.forward_limit, Some(42));
        assert_eq!(config.checkpoint_tx_id.as_deref(), Some("tx-1"));
        assert_eq!(config.full_refresh_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.endpoints.sequencer, "http://localhost:9000");
        assert!(!config.full_refresh_enabled());
    }

    #[test]
    fn test_timeout_flags_override_transport_defaults() {
        let defaults = TestCli::try_parse_from(["test", "--process-id", "pid"])
            .unwrap()
            .replica
            .into_config();
        assert_eq!(
            (defaults.request_timeout, defaults.connect_timeout),
            default_timeouts()
        );

        let config = TestCli::try_parse_from([
            "test",
            "--process-id",
            "pid",
            "--request-timeout-secs",
            "4",
            "--connect-timeout-secs",
            "2",
        ])
        .unwrap()
        .replica
        .into_config();
        assert_eq!(config.request_timeout, Duration::from_secs(4));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_negative_forward_limit_is_rejected() {
        let parsed = TestCli::try_parse_from([
            "test",
            "--process-id",
            "pid",
            "--forward-to-nonce",
            "-3",
        ]);
        assert!(parsed.is_err());
    }
}
