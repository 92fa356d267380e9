//! Retransmission parameters shared by every session

use std::time::Duration;

use serde::Deserialize;

/// Default number of retransmissions before a transfer is abandoned
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default time to wait for the peer before retransmitting
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry budget and per-wait timeout.
///
/// A session sends a packet, waits up to `timeout` for the answer and
/// retransmits at most `retry_count` times before failing with
/// [`TransferError::Timeout`](super::TransferError::Timeout).
///
/// ```toml
/// [retry]
/// retry_count = 5
/// timeout = "2s"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retry_count: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, timeout: Duration) -> Self {
        Self { retry_count, timeout }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_count, 3);
        assert_eq!(policy.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_deserialize_humantime() {
        let policy: RetryPolicy = toml::from_str("retry_count = 7\ntimeout = \"250ms\"").unwrap();
        assert_eq!(policy, RetryPolicy::new(7, Duration::from_millis(250)));

        let partial: RetryPolicy = toml::from_str("retry_count = 1").unwrap();
        assert_eq!(partial.timeout, DEFAULT_TIMEOUT);
    }
}
