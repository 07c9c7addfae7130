//! Default endpoints.

/// Sequencer (scheduler unit) router.
pub const DEFAULT_SEQUENCER_URL: &str = "https://su-router.ao-testnet.xyz";
/// GraphQL index used for checkpoint and metadata lookups.
pub const DEFAULT_GRAPHQL_URL: &str = "https://arweave-search.goldsky.com/graphql";
/// Gateway serving raw transaction data.
pub const DEFAULT_GATEWAY_URL: &str = "https://arweave.net";
/// Compute unit serving live process state.
pub const DEFAULT_STATE_URL: &str = "https://cu.ao-testnet.xyz";

/// The four remote services a replica talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub sequencer: String,
    pub graphql: String,
    pub gateway: String,
    pub state: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            sequencer: DEFAULT_SEQUENCER_URL.to_string(),
            graphql: DEFAULT_GRAPHQL_URL.to_string(),
            gateway: DEFAULT_GATEWAY_URL.to_string(),
            state: DEFAULT_STATE_URL.to_string(),
        }
    }
}
