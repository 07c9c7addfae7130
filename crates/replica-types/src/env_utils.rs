//! Environment variable parsing helpers.
//!
//! Configuration values that are not worth a dedicated setting (transport
//! timeouts) are read through these helpers so that unset and unparsable
//! values behave the same way everywhere: the default wins.
//!
//! # Example
//!
//! ```
//! use replica_types::env_utils::env_secs;
//! use std::time::Duration;
//!
//! let timeout: Duration = env_secs("AOS_REPLICA_CONNECT_TIMEOUT_SECS", 10);
//! assert!(timeout.as_secs() > 0);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable, falling back to `default` when it is
/// unset, blank, or does not parse.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Whole seconds from the environment, as a [`Duration`].
pub fn env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_var_or(key, default_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_uses_default() {
        let value: u64 = env_var_or("AOS_REPLICA_TEST_SURELY_UNSET_1", 42);
        assert_eq!(value, 42);
        assert_eq!(
            env_secs("AOS_REPLICA_TEST_SURELY_UNSET_2", 7),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn test_set_variable_is_parsed_and_garbage_ignored() {
        std::env::set_var("AOS_REPLICA_TEST_ENV_SECS", " 12 ");
        assert_eq!(
            env_secs("AOS_REPLICA_TEST_ENV_SECS", 7),
            Duration::from_secs(12)
        );
        std::env::set_var("AOS_REPLICA_TEST_ENV_SECS", "soon");
        assert_eq!(
            env_secs("AOS_REPLICA_TEST_ENV_SECS", 7),
            Duration::from_secs(7)
        );
        std::env::remove_var("AOS_REPLICA_TEST_ENV_SECS");
    }
}
