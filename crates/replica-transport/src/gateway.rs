//! Gateway client for raw transaction data.

use crate::error::TransportError;
use crate::http::{build_agent, default_timeouts, join_url, read_body};
use std::time::Duration;
use tracing::debug;

/// Fetches transaction payloads (checkpoint blobs are gzip compressed).
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    agent: ureq::Agent,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        let (timeout, connect_timeout) = default_timeouts();
        Self::with_timeouts(base_url, timeout, connect_timeout)
    }

    pub fn with_timeouts(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: build_agent(timeout, connect_timeout),
        }
    }

    pub fn data_url(&self, tx_id: &str) -> String {
        join_url(&self.base_url, tx_id)
    }

    /// Raw (still compressed) bytes of a transaction's data.
    pub fn fetch_data(&self, tx_id: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.data_url(tx_id);
        debug!(%url, "fetching transaction data");
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| TransportError::from_ureq(&url, e))?;
        read_body(&url, response)
    }
}
