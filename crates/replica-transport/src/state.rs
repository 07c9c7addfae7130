//! State service client.
//!
//! `GET {cu}/state/{process}` returns the process's current memory as the
//! response body, with its position in the log carried in headers:
//!
//! | header | meaning |
//! |--------|---------|
//! | `last-ordinate` | nonce of the last evaluated message |
//! | `last-nonce` | same, on newer deployments |
//! | `last-timestamp` | timestamp of that message |
//! | `last-block-height` | block height of that message |

use crate::error::TransportError;
use crate::http::{build_agent, default_timeouts, join_url, read_body};
use std::time::Duration;
use tracing::debug;

/// Header values exactly as served; parsing is left to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveStateHeaders {
    pub last_nonce: Option<String>,
    pub last_timestamp: Option<String>,
    pub last_block_height: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLiveState {
    pub body: Vec<u8>,
    pub headers: LiveStateHeaders,
}

#[derive(Clone)]
pub struct StateClient {
    base_url: String,
    agent: ureq::Agent,
}

impl StateClient {
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

    pub fn state_url(&self, process_id: &str) -> String {
        join_url(&self.base_url, &format!("state/{process_id}"))
    }

    /// Fetch the current state. Never served from any cache.
    pub fn fetch_state(&self, process_id: &str) -> Result<RawLiveState, TransportError> {
        let url = self.state_url(process_id);
        debug!(%url, "fetching live state");
        let response = self
            .agent
            .get(&url)
            .set("Cache-Control", "no-cache")
            .call()
            .map_err(|e| TransportError::from_ureq(&url, e))?;
        let headers = headers_of(&response);
        let body = read_body(&url, response)?;
        Ok(RawLiveState { body, headers })
    }
}

fn headers_of(response: &ureq::Response) -> LiveStateHeaders {
    let header = |name: &str| response.header(name).map(|v| v.trim().to_string());
    LiveStateHeaders {
        last_nonce: header("last-ordinate").or_else(|| header("last-nonce")),
        last_timestamp: header("last-timestamp"),
        last_block_height: header("last-block-height"),
    }
}
