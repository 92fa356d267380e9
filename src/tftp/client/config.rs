use std::net::{IpAddr, SocketAddr};

use crate::tftp::core::RetryPolicy;

/// TFTP client configuration
///
/// # Example
///
/// ```rust
/// use xtftp::tftp::client::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// assert_eq!(config.mode, "octet");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server IP address
    pub server_ip: IpAddr,
    /// Server port number
    pub server_port: u16,
    /// Retransmission budget
    pub retry: RetryPolicy,
    /// Transfer mode, sent as-is (octet unless told otherwise)
    pub mode: String,
}

impl ClientConfig {
    /// Create new client configuration
    ///
    /// # Arguments
    ///
    /// * `server_ip` - Server IP address
    /// * `server_port` - Server port number (usually 69)
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            retry: RetryPolicy::default(),
            mode: "octet".to_string(),
        }
    }

    /// Set the retransmission policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set transfer mode
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Address requests are sent to
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(IpAddr::from([127, 0, 0, 1]), 69)
    }
}
