//! Shared agent construction and body handling.

use crate::error::TransportError;
use replica_types::env_utils::env_secs;
use std::io::Read;
use std::time::Duration;

/// Default request timeout in seconds (overridable by env).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default connect timeout in seconds (overridable by env).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Request and connect timeouts, honouring `AOS_REPLICA_HTTP_TIMEOUT_SECS`
/// and `AOS_REPLICA_CONNECT_TIMEOUT_SECS`.
pub fn default_timeouts() -> (Duration, Duration) {
    (
        env_secs("AOS_REPLICA_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
        env_secs(
            "AOS_REPLICA_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        ),
    )
}

pub fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .timeout_connect(connect_timeout)
        .build()
}

/// Read a full response body into memory.
pub(crate) fn read_body(url: &str, response: ureq::Response) -> Result<Vec<u8>, TransportError> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| TransportError::from_io(url, e))?;
    Ok(bytes)
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(
    url: &str,
    response: ureq::Response,
) -> Result<T, TransportError> {
    let bytes = read_body(url, response)?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::decode(url, e))
}

/// Join a base URL and a path segment with exactly one slash.
pub fn join_url(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(join_url("https://arweave.net/", "/abc"), "https://arweave.net/abc");
        assert_eq!(join_url("https://arweave.net", "abc"), "https://arweave.net/abc");
    }
}
