use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::tftp::core::RetryPolicy;

/// TFTP server configuration
///
/// # Example
///
/// ```rust
/// use xtftp::tftp::server::Config;
/// use std::path::PathBuf;
///
/// let config = Config::new(
///     "127.0.0.1".parse().unwrap(),
///     69,
///     PathBuf::from("/tmp/tftp"),
///     false,
/// );
/// assert_eq!(config.bind_addr().port(), 69);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address to listen on
    pub ip_address: IpAddr,
    /// Port number to listen on
    pub port: u16,
    /// Directory for uploaded files (defaults to same as directory)
    pub receive_directory: PathBuf,
    /// Directory for downloaded files (defaults to same as directory)
    pub send_directory: PathBuf,
    /// Whether to use read-only mode (reject all write requests)
    pub read_only: bool,
    /// Whether to overwrite existing files
    pub overwrite: bool,
    /// Retransmission budget for every transfer
    pub retry: RetryPolicy,
}

impl Config {
    /// Create a new configuration
    ///
    /// # Arguments
    ///
    /// * `ip_address` - IP address to listen on
    /// * `port` - Port number to listen on
    /// * `directory` - Root directory for files
    /// * `read_only` - Whether to use read-only mode
    pub fn new(ip_address: IpAddr, port: u16, directory: PathBuf, read_only: bool) -> Self {
        let receive_directory = directory.clone();
        let send_directory = directory;

        Self {
            ip_address,
            port,
            receive_directory,
            send_directory,
            read_only,
            overwrite: true, // Allow overwrite by default
            retry: RetryPolicy::default(),
        }
    }

    /// Set whether existing files may be replaced by uploads
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the retransmission policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Address of the well-known socket
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        use std::net::Ipv4Addr;

        Self::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            69,
            std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new("0.0.0.0".parse().unwrap(), 6969, PathBuf::from("/srv/tftp"), true);
        assert_eq!(config.send_directory, PathBuf::from("/srv/tftp"));
        assert_eq!(config.receive_directory, PathBuf::from("/srv/tftp"));
        assert!(config.read_only);
        assert!(config.overwrite);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_config_builders() {
        let config = Config::default()
            .with_overwrite(false)
            .with_retry_policy(RetryPolicy::new(1, Duration::from_millis(100)));
        assert!(!config.overwrite);
        assert_eq!(config.retry.retry_count, 1);
        assert_eq!(config.bind_addr(), "127.0.0.1:69".parse().unwrap());
    }
}
